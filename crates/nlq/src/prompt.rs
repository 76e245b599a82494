//! Prompt rendering for SQL generation.
//!
//! Two prompts exist: the initial one for a fresh question, and the repair
//! one that additionally quotes the failing SQL and the engine's error so
//! the model can correct itself.

use chrono::NaiveDate;

/// Everything a prompt needs to know about the request.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub question: &'a str,
    pub schema_text: &'a str,
    pub allowed_shops: &'a [String],
    pub today: NaiveDate,
    pub max_days_lookback: u32,
    pub timezone: &'a str,
}

impl PromptContext<'_> {
    fn min_allowed(&self) -> NaiveDate {
        self.today - chrono::Duration::days(self.max_days_lookback as i64)
    }

    fn allowlist_text(&self) -> String {
        self.allowed_shops
            .iter()
            .map(|s| format!("'{}'", s))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rules shared by both prompts; the reply contract the model must follow.
fn rules_and_contract(ctx: &PromptContext<'_>) -> String {
    format!(
        r#"## Rules
- Emit at most ONE SELECT statement (WITH-clauses are allowed). No semicolons, no SQL comments.
- Restrict shop_id to the allowed shops: {allowlist}. Use shop_id = '…' or shop_id IN (…).
- Always filter the partition column dt with a lower bound of date '{min_allowed}' or later
  (today is {today} in {tz}; the lookback limit is {max_days} days).
- Prefer partition pruning: put the dt filter directly in the WHERE clause.
- Wrap aggregates in COALESCE(…, 0) so empty ranges return 0 instead of NULL.

## Reply format
Respond with a SINGLE JSON object and nothing else:
{{
  "sql": "<the SELECT statement, or null>",
  "confidence": <0.0 to 1.0>,
  "assumptions": ["<assumption>", …],
  "needs_clarification": <true|false>,
  "clarifying_question": "<question, or null>"
}}
If the question is too ambiguous to answer, set needs_clarification to true
and ask ONE clarifying question instead of emitting SQL."#,
        allowlist = ctx.allowlist_text(),
        min_allowed = ctx.min_allowed(),
        today = ctx.today,
        tz = ctx.timezone,
        max_days = ctx.max_days_lookback,
    )
}

/// Prompt for the first generation attempt.
pub fn initial_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        r#"You translate business questions about a merchant analytics warehouse into Athena SQL.

## Schema
{schema}

{rules}

## Question
{question}"#,
        schema = ctx.schema_text,
        rules = rules_and_contract(ctx),
        question = ctx.question,
    )
}

/// Prompt for a correction attempt after the engine rejected the SQL.
pub fn repair_prompt(ctx: &PromptContext<'_>, prev_sql: &str, engine_error: &str) -> String {
    format!(
        r#"You translate business questions about a merchant analytics warehouse into Athena SQL.
Your previous attempt failed. Produce a corrected query for the same question.

## Schema
{schema}

## Previous SQL
{prev_sql}

## Error
{error}

{rules}

## Question
{question}"#,
        schema = ctx.schema_text,
        prev_sql = prev_sql,
        error = engine_error,
        rules = rules_and_contract(ctx),
        question = ctx.question,
    )
}
