use bpr_core::{DocumentEntry, PromptContext, SessionState, UploadedDocument, MAX_FILES};
use bpr_error::{BprError, Result};
use bpr_extract::extract_document;
use bpr_llm::{collect_stream, ChatModel, CollectedResponse, StreamOutcome};
use bpr_report::build_report_prompt;
use chrono::Utc;

pub struct GenerateInput {
    pub user_name: String,
    pub organization: String,
    pub documents: Vec<UploadedDocument>,
}

/// Input validation happens before any extraction or network call; a
/// failure here is a warning to the user, not a fault.
pub fn validate_generate(input: &GenerateInput) -> Result<()> {
    if input.user_name.trim().is_empty() || input.organization.trim().is_empty() {
        return Err(BprError::Validation {
            message: "Please enter your name and organization before generating the report."
                .to_string(),
        });
    }
    if input.documents.is_empty() {
        return Err(BprError::Validation {
            message: "Please upload at least one file.".to_string(),
        });
    }
    if input.documents.len() > MAX_FILES {
        return Err(BprError::Validation {
            message: format!("At most {} documents are accepted per report.", MAX_FILES),
        });
    }
    Ok(())
}

pub fn validate_followup(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(BprError::Validation {
            message: "Please enter a question before asking.".to_string(),
        });
    }
    Ok(())
}

/// Extract every uploaded document, one at a time, in upload order.
pub async fn assemble_context(input: &GenerateInput) -> PromptContext {
    let mut documents = Vec::with_capacity(input.documents.len());
    for doc in &input.documents {
        let extracted = extract_document(doc).await;
        documents.push(DocumentEntry {
            extracted,
            description: doc.description.clone(),
        });
    }
    PromptContext {
        user_name: input.user_name.clone(),
        organization: input.organization.clone(),
        documents,
    }
}

/// Issue one streaming call and collect it. A request that fails before the
/// first chunk behaves like a stream that failed with an empty buffer.
pub async fn run_stream<F>(chat: &dyn ChatModel, prompt: &str, on_update: F) -> CollectedResponse
where
    F: FnMut(&str),
{
    match chat.chat_stream(prompt).await {
        Ok(stream) => collect_stream(stream, on_update).await,
        Err(error) => {
            error.log("llm_request");
            CollectedResponse::failed_before_start(error)
        }
    }
}

pub struct PipelineResult {
    pub session: SessionState,
    pub outcome: StreamOutcome,
}

/// The full generate action: extract, assemble, stream, and produce the
/// session state that replaces whatever the session held before.
pub async fn run_report_pipeline<F>(
    chat: &dyn ChatModel,
    input: GenerateInput,
    on_update: F,
) -> PipelineResult
where
    F: FnMut(&str),
{
    let ctx = assemble_context(&input).await;
    let full_prompt = build_report_prompt(&ctx);
    let collected = run_stream(chat, &full_prompt, on_update).await;

    PipelineResult {
        session: SessionState {
            user_name: input.user_name,
            organization: input.organization,
            full_prompt,
            report_text: collected.text,
            generated_at: Utc::now(),
        },
        outcome: collected.outcome,
    }
}
