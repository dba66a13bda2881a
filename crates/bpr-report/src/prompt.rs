use bpr_core::{PromptContext, SessionState};

/// Instruction template for the improvement report. Three substitution
/// points: user, organization, and the concatenated documents block.
const REPORT_TEMPLATE: &str = "\
You are an AI Business Process Reengineering Expert for manufacturing. Do not hallucinate and give results within
the provided documents, refer only real fact data to generate result.

Generate a detailed report for:
- User: {user}
- Organization: {org}

Produce a structured improvement report including:
1) Overview of current process
2) Detected inefficiencies / bottlenecks
3) Proposed reengineering actions (detailed steps)
4) Expected business benefits (KPI impact estimates, timeline)
5) Benchmark comparisons if applicable
6) Automation & digitalization opportunities
7) Risks & mitigations

Use Lean, Six Sigma concepts where relevant and be concise and actionable.

Documents:
{documents}
";

/// One labeled block per uploaded file. A missing description renders as an
/// empty field; the file still appears.
pub fn format_document_block(name: &str, description: Option<&str>, text: &str) -> String {
    format!(
        "File: {}\nDescription: {}\nContent:\n{}",
        name,
        description.unwrap_or(""),
        text
    )
}

/// Assemble the full report prompt. Pure: document order follows upload
/// order, same-named files are neither merged nor deduplicated.
pub fn build_report_prompt(ctx: &PromptContext) -> String {
    let documents = ctx
        .documents
        .iter()
        .map(|d| {
            format_document_block(
                &d.extracted.source_name,
                d.description.as_deref(),
                &d.extracted.text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    REPORT_TEMPLATE
        .replace("{user}", &ctx.user_name)
        .replace("{org}", &ctx.organization)
        .replace("{documents}", &documents)
}

/// The stored context a follow-up question is grounded against: the full
/// prompt plus the completed report text.
pub fn session_context(state: &SessionState) -> String {
    format!(
        "{}\n\nLLM Response:\n{}",
        state.full_prompt, state.report_text
    )
}

pub fn build_followup_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n\nUser follow-up question: {}\nAnswer concisely based on the context.",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpr_core::{DocumentEntry, ExtractedText};
    use chrono::Utc;

    fn entry(name: &str, description: Option<&str>, text: &str) -> DocumentEntry {
        DocumentEntry {
            extracted: ExtractedText {
                source_name: name.to_string(),
                text: text.to_string(),
                truncated: false,
            },
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn block_is_byte_identical_to_extraction() {
        let block = format_document_block("plan.pdf", Some("the plan"), "step one\nstep two");
        assert_eq!(
            block,
            "File: plan.pdf\nDescription: the plan\nContent:\nstep one\nstep two"
        );
    }

    #[test]
    fn empty_extraction_still_lists_the_file() {
        // a PDF whose pages carry no extractable text contributes an empty
        // content section, not an error marker
        let ctx = PromptContext {
            user_name: "Jane".to_string(),
            organization: "Acme".to_string(),
            documents: vec![entry("scan.pdf", Some("scanned form"), "")],
        };
        let prompt = build_report_prompt(&ctx);
        assert!(prompt.contains("File: scan.pdf\nDescription: scanned form\nContent:\n"));
        assert!(!prompt.contains("[Error reading"));
    }

    #[test]
    fn prompt_substitutes_user_org_and_preserves_order() {
        let ctx = PromptContext {
            user_name: "Jane".to_string(),
            organization: "Acme".to_string(),
            documents: vec![
                entry("b.csv", None, "second in name, first in order"),
                entry("a.csv", None, "first in name, second in order"),
            ],
        };
        let prompt = build_report_prompt(&ctx);
        assert!(prompt.contains("- User: Jane"));
        assert!(prompt.contains("- Organization: Acme"));
        let b = prompt.find("File: b.csv").unwrap();
        let a = prompt.find("File: a.csv").unwrap();
        assert!(b < a);
    }

    #[test]
    fn followup_prompt_appends_question_to_context() {
        let state = SessionState {
            user_name: "Jane".to_string(),
            organization: "Acme".to_string(),
            full_prompt: "PROMPT".to_string(),
            report_text: "REPORT".to_string(),
            generated_at: Utc::now(),
        };
        let context = session_context(&state);
        assert_eq!(context, "PROMPT\n\nLLM Response:\nREPORT");

        let followup = build_followup_prompt(&context, "what about lead time?");
        assert_eq!(
            followup,
            "PROMPT\n\nLLM Response:\nREPORT\n\nUser follow-up question: what about lead time?\nAnswer concisely based on the context."
        );
    }
}
