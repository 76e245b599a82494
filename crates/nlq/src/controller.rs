//! The self-correction state machine.
//!
//! Validate then execute, then up to `max_fix_attempts` repair rounds. A
//! rejection of the *initial* SQL surfaces immediately: validator failures
//! are deterministic in the model's output, so retrying the same prompt
//! cannot help. After a failed execution each repair round re-prompts the
//! model with the failing SQL and the error, re-validates, and re-executes.
//! Clarifications short-circuit the loop at any point; transport failures
//! abort it.

use chrono::NaiveDate;
use tracing::{debug, warn};

use shopsight_athena::{QueryOutput, QueryRunner};
use shopsight_llm::{LlmReply, ModelError, NlqModel};
use shopsight_sqlguard::{has_partition_lower_bound, validate, RejectReason, ValidateOptions};

use crate::prompt::{initial_prompt, repair_prompt, PromptContext};

/// Terminal state of one correction run.
#[derive(Debug)]
pub enum Outcome {
    /// A validated statement executed successfully.
    Done {
        output: QueryOutput,
        sql: String,
        reply: LlmReply,
    },
    /// The model asked for clarification instead of emitting SQL.
    Clarify { reply: LlmReply },
    /// The initial statement failed validation.
    Rejected {
        reason: RejectReason,
        sql: String,
        reply: LlmReply,
    },
    /// All attempts exhausted (or the loop aborted).
    Failed {
        last_sql: String,
        last_error: String,
        reply: LlmReply,
    },
}

/// Re-impose the partition floor on a statement that validated without a
/// textual lower-bound marker (possible only when the partition filter is
/// not required). The wrap applies to the SQL that will actually execute.
pub fn ensure_partition_floor(sql: String, min_allowed: NaiveDate) -> String {
    if has_partition_lower_bound(&sql) {
        sql
    } else {
        format!("SELECT * FROM ({}) WHERE dt >= date '{}'", sql, min_allowed)
    }
}

/// Run the correction loop for one question.
///
/// Executor invocations are bounded by `max_fix_attempts + 1`. The only
/// `Err` is a transport failure on the *initial* model call; transport
/// failures during repair fold into `Outcome::Failed` with the prior state.
pub async fn correct_and_execute(
    model: &NlqModel,
    runner: &dyn QueryRunner,
    opts: &ValidateOptions,
    ctx: &PromptContext<'_>,
    max_fix_attempts: u32,
) -> Result<Outcome, ModelError> {
    let mut prev_sql = String::new();
    let mut last_error: String;
    let mut last_reply = LlmReply::default();

    // ── Attempt 0: initial generation ────────────────────────────
    match model.invoke(&initial_prompt(ctx)).await {
        Ok(reply) => {
            if reply.needs_clarification {
                return Ok(Outcome::Clarify { reply });
            }
            let Some(sql) = reply.sql_candidate().map(str::to_string) else {
                return Err(ModelError::Protocol("reply carried no SQL".into()));
            };

            if let Err(reason) = validate(&sql, opts) {
                debug!(reason = %reason, "Initial SQL rejected");
                return Ok(Outcome::Rejected { reason, sql, reply });
            }

            match runner.run(&sql).await {
                Ok(output) => return Ok(Outcome::Done { output, sql, reply }),
                Err(e) if e.is_repairable() => {
                    debug!(error = %e, "Initial execution failed, entering repair");
                    last_error = e.to_string();
                    prev_sql = sql;
                    last_reply = reply;
                }
                Err(e) => {
                    return Ok(Outcome::Failed {
                        last_sql: sql,
                        last_error: e.to_string(),
                        reply,
                    });
                }
            }
        }
        Err(ModelError::Transport(e)) => return Err(ModelError::Transport(e)),
        Err(ModelError::Protocol(msg)) => {
            // A malformed reply counts as a rejected attempt. There is no
            // SQL yet, so the repair prompt quotes the protocol error.
            last_error = format!("model reply was not usable: {}", msg);
        }
    }

    // ── Repair rounds ────────────────────────────────────────────
    for attempt in 1..=max_fix_attempts {
        debug!(attempt, last_error = %last_error, "Repair attempt");

        let reply = match model.invoke(&repair_prompt(ctx, &prev_sql, &last_error)).await {
            Ok(r) => r,
            Err(ModelError::Transport(e)) => {
                warn!(error = %e, "Model transport failure during repair, aborting loop");
                return Ok(Outcome::Failed {
                    last_sql: prev_sql,
                    last_error,
                    reply: last_reply,
                });
            }
            Err(ModelError::Protocol(msg)) => {
                last_error = format!("model reply was not usable: {}", msg);
                continue;
            }
        };

        if reply.needs_clarification {
            return Ok(Outcome::Clarify { reply });
        }

        let Some(sql) = reply.sql_candidate().map(str::to_string) else {
            last_error = "model reply carried no SQL".into();
            continue;
        };

        if let Err(reason) = validate(&sql, opts) {
            // The next repair sees the validator's rejection, not the engine's.
            last_error = reason.to_string();
            prev_sql = sql;
            last_reply = reply;
            continue;
        }

        let sql = ensure_partition_floor(sql, opts.min_allowed());

        match runner.run(&sql).await {
            Ok(output) => return Ok(Outcome::Done { output, sql, reply }),
            Err(e) if e.is_repairable() => {
                last_error = e.to_string();
                prev_sql = sql;
                last_reply = reply;
            }
            Err(e) => {
                return Ok(Outcome::Failed {
                    last_sql: sql,
                    last_error: e.to_string(),
                    reply,
                });
            }
        }
    }

    Ok(Outcome::Failed {
        last_sql: prev_sql,
        last_error,
        reply: last_reply,
    })
}
