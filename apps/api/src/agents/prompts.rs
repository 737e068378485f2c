//! Prompt templates for the generation agents. `{placeholders}` are filled
//! with `str::replace` at call time.

pub const JOB_PARSE_SYSTEM: &str = r#"You are a job posting parser. Extract structured information from job postings.

Extract:
- title: the exact job title as written. Use the full title; never shorten, rephrase, or generalize it.
- company: the employer actually hiring for this role, NOT a recruitment agency, job board, or staffing firm. If the posting says "on behalf of", "client", or "partner company", extract the actual employer. If it cannot be determined, use "Unknown".
- location: city/state/country, or "Remote".
- requirements: specific requirements (skills, experience, education).
- responsibilities: duties of the role.
- keywords: every technology, tool, framework, and methodology mentioned. Be thorough.
- description: a brief summary of the role.

Extract ONLY what is explicitly stated in the text. Never infer or fabricate names.
Respond with a single JSON object and nothing else:
{"title": "...", "company": "...", "location": "...", "requirements": [...], "responsibilities": [...], "keywords": [...], "description": "..."}"#;

pub const JOB_PARSE_PROMPT_TEMPLATE: &str = "Parse this job posting:\n\n{job_text}";

pub const OPTIMIZE_SYSTEM: &str = r#"You are a resume optimizer. Rewrite the candidate's source resume so it targets the given job while staying strictly truthful to the source.

Rules:
- Use ONLY facts present in the source resume. Never invent employers, titles, dates, degrees, metrics, or skills.
- Reorder and rephrase to foreground the experience most relevant to the job.
- Work the job's keywords into bullets naturally wherever the source supports them.
- Prefer strong verbs and quantified impact; keep every metric that appears in the source.
- Output Markdown with exactly these sections when the source supports them: a name/contact header, Summary, Experience, Skills, Education.

Respond with a single JSON object and nothing else:
{"content": "<the full optimized resume as Markdown>", "keywords_used": ["..."]}"#;

pub const OPTIMIZE_PROMPT_TEMPLATE: &str = r#"SOURCE RESUME:
{source}

TARGET JOB (parsed):
{job_json}
{feedback_block}
Produce the optimized resume."#;

/// Prepended to the feedback section of a refinement iteration.
pub const FEEDBACK_HEADER: &str =
    "VALIDATOR FEEDBACK FROM THE PREVIOUS ATTEMPT (fix every issue listed):";
