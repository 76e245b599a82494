use serde::{Deserialize, Serialize};

use crate::shape::Shaped;

/// Wire envelope for one answered question.
///
/// `Result` is the only variant ever cached; everything else is computed
/// fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AskResponse {
    Result {
        cached: bool,
        sql: String,
        assumptions: Vec<String>,
        confidence: f64,
        result: Shaped,
        query_id: String,
        scanned_bytes: u64,
        exec_ms: u64,
    },
    Clarification {
        clarifying_question: String,
        assumptions: Vec<String>,
        confidence: f64,
    },
    SqlRejected {
        reason: String,
        model_sql: String,
        assumptions: Vec<String>,
        confidence: f64,
    },
    AthenaFailed {
        error: String,
        last_sql: String,
        assumptions: Vec<String>,
        confidence: f64,
    },
    NoShops {
        error: String,
    },
}

impl AskResponse {
    /// Only successful results are cache-eligible.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, AskResponse::Result { .. })
    }

    /// Flip the `cached` marker on a `Result` envelope.
    pub fn mark_cached(mut self) -> Self {
        if let AskResponse::Result { cached, .. } = &mut self {
            *cached = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_serialize_snake_case() {
        let resp = AskResponse::NoShops {
            error: "no accessible shops".into(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "no_shops");

        let resp = AskResponse::SqlRejected {
            reason: "shop_id value not allowed: c.myshopify.com".into(),
            model_sql: "SELECT 1".into(),
            assumptions: vec![],
            confidence: 0.4,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "sql_rejected");
        assert_eq!(json["model_sql"], "SELECT 1");
    }

    #[test]
    fn only_result_is_cacheable() {
        let clar = AskResponse::Clarification {
            clarifying_question: "which metric?".into(),
            assumptions: vec![],
            confidence: 0.2,
        };
        assert!(!clar.is_cacheable());
    }

    #[test]
    fn mark_cached_flips_result_only() {
        let resp = AskResponse::Result {
            cached: false,
            sql: "SELECT 1".into(),
            assumptions: vec![],
            confidence: 1.0,
            result: crate::shape::shape(vec![], vec![]),
            query_id: "q-1".into(),
            scanned_bytes: 0,
            exec_ms: 0,
        };
        match resp.mark_cached() {
            AskResponse::Result { cached, .. } => assert!(cached),
            _ => unreachable!(),
        }
    }
}
