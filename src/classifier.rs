//! Yes/no routing of user questions.
//!
//! The chat model decides whether a question concerns the indexed source
//! code. Only an exact `yes` (after trimming and lower-casing) routes the
//! question to retrieval; any other reply is treated as "no".

use anyhow::Result;
use tracing::debug;

use crate::llm::ChatModel;

pub fn classifier_prompt(query: &str) -> String {
    format!(
        "Answer with only 'Yes' or 'No'.\nIs the following question specifically about the source code, programming logic, or repository content?\nQuestion: {}",
        query
    )
}

/// Ask `model` whether `query` is about the indexed code.
pub async fn is_code_related(model: &dyn ChatModel, query: &str) -> Result<bool> {
    let reply = model.complete(&classifier_prompt(query)).await?;
    let verdict = parse_yes_no(&reply);
    debug!(reply = %reply.trim(), verdict, "classified query");
    Ok(verdict)
}

pub fn parse_yes_no(reply: &str) -> bool {
    reply.trim().to_lowercase() == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChat;

    #[test]
    fn test_parse_yes_no() {
        assert!(parse_yes_no("Yes"));
        assert!(!parse_yes_no("No"));
        assert!(parse_yes_no("  YES  "));
        assert!(!parse_yes_no("Maybe"));
        assert!(!parse_yes_no("Yes."));
        assert!(!parse_yes_no(""));
    }

    #[test]
    fn test_prompt_embeds_question() {
        let prompt = classifier_prompt("What does Session do?");
        assert!(prompt.starts_with("Answer with only 'Yes' or 'No'.\n"));
        assert!(prompt.ends_with("\nQuestion: What does Session do?"));
    }

    #[tokio::test]
    async fn test_is_code_related_uses_model_reply() {
        let model = ScriptedChat::new(&["Yes\n", "no"]);
        assert!(is_code_related(&model, "How is retry implemented?").await.unwrap());
        assert!(!is_code_related(&model, "What is the weather?").await.unwrap());

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].ends_with("Question: How is retry implemented?"));
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = ScriptedChat::new(&[]);
        assert!(is_code_related(&model, "anything").await.is_err());
    }
}
