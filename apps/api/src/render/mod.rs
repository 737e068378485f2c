//! Renderer — turns the final Markdown draft into a self-contained HTML
//! artifact and stores it in S3. PDF output is a separate concern handled
//! downstream; the artifact reference recorded here is what makes a run
//! `complete`.

use aws_sdk_s3::primitives::ByteStream;
use tracing::info;
use uuid::Uuid;

use crate::agents::job_parser::ParsedJob;
use crate::errors::AppError;

/// Renders the draft as a standalone HTML page. The draft is
/// heading/bullet/paragraph Markdown by construction (the optimizer's output
/// contract), so a line-oriented conversion is all that is needed.
pub fn render_html(content: &str, job: &ParsedJob) -> String {
    let mut body = String::new();
    let mut in_list = false;

    for line in content.lines() {
        let line = line.trim_end();
        let trimmed = line.trim_start();

        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));

        if let Some(item) = bullet {
            if !in_list {
                body.push_str("<ul>\n");
                in_list = true;
            }
            body.push_str(&format!("<li>{}</li>\n", escape_html(item)));
            continue;
        }
        if in_list {
            body.push_str("</ul>\n");
            in_list = false;
        }

        if let Some(h) = trimmed.strip_prefix("### ") {
            body.push_str(&format!("<h3>{}</h3>\n", escape_html(h)));
        } else if let Some(h) = trimmed.strip_prefix("## ") {
            body.push_str(&format!("<h2>{}</h2>\n", escape_html(h)));
        } else if let Some(h) = trimmed.strip_prefix("# ") {
            body.push_str(&format!("<h1>{}</h1>\n", escape_html(h)));
        } else if !trimmed.is_empty() {
            body.push_str(&format!("<p>{}</p>\n", escape_html(trimmed)));
        }
    }
    if in_list {
        body.push_str("</ul>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Resume — {title} at {company}</title>
<style>
body {{ font-family: Georgia, serif; max-width: 52rem; margin: 2rem auto; line-height: 1.45; color: #1a1a1a; }}
h1 {{ font-size: 1.6rem; margin-bottom: 0.2rem; }}
h2 {{ font-size: 1.1rem; border-bottom: 1px solid #999; margin-top: 1.4rem; }}
h3 {{ font-size: 1rem; margin-bottom: 0.1rem; }}
ul {{ margin-top: 0.3rem; }}
</style>
</head>
<body>
{body}</body>
</html>
"#,
        title = escape_html(&job.title),
        company = escape_html(&job.company),
        body = body
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Uploads the rendered artifact and returns its storage key.
pub async fn store_artifact(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    account_id: Uuid,
    run_id: Uuid,
    html: &str,
) -> Result<String, AppError> {
    let key = format!("results/{account_id}/{run_id}.html");
    s3.put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(html.as_bytes().to_vec()))
        .content_type("text/html")
        .send()
        .await
        .map_err(|e| AppError::S3(format!("Artifact upload failed: {e}")))?;

    info!("Uploaded artifact to s3://{bucket}/{key}");
    Ok(key)
}

/// Downloads a stored artifact.
pub async fn fetch_artifact(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<Vec<u8>, AppError> {
    let object = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("Artifact download failed: {e}")))?;

    let data = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::S3(format!("Artifact read failed: {e}")))?;
    Ok(data.into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ParsedJob {
        ParsedJob {
            title: "Senior Rust Engineer".to_string(),
            company: "Acme <Robotics>".to_string(),
            location: String::new(),
            requirements: vec![],
            responsibilities: vec![],
            keywords: vec![],
            description: String::new(),
        }
    }

    #[test]
    fn test_headings_and_bullets_convert() {
        let html = render_html("# Jane Doe\n## Experience\n- Cut latency by 40%\n- Saved $1M", &job());
        assert!(html.contains("<h1>Jane Doe</h1>"));
        assert!(html.contains("<h2>Experience</h2>"));
        assert!(html.contains("<li>Cut latency by 40%</li>"));
        assert!(html.contains("<ul>"));
        assert!(html.contains("</ul>"));
    }

    #[test]
    fn test_list_is_closed_before_following_heading() {
        let html = render_html("- one\n- two\n## Skills", &job());
        let ul_close = html.find("</ul>").unwrap();
        let skills = html.find("<h2>Skills</h2>").unwrap();
        assert!(ul_close < skills);
    }

    #[test]
    fn test_html_in_content_is_escaped() {
        let html = render_html("# <script>alert(1)</script>", &job());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_job_fields_in_title_are_escaped() {
        let html = render_html("# Jane", &job());
        assert!(html.contains("Acme &lt;Robotics&gt;"));
    }

    #[test]
    fn test_prose_lines_become_paragraphs() {
        let html = render_html("Seasoned engineer with a decade in infrastructure.", &job());
        assert!(html.contains("<p>Seasoned engineer"));
    }
}
