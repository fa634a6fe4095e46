use deepwiki_ai::{GenerationRequest, ProviderRegistry, repository_system_prompt};
use futures::StreamExt;
use serde_json::{Map, Value, json};

use crate::error::ToolError;
use crate::events::{
    PROGRESS_GENERATING_ANSWER, PROGRESS_PREPARING_RETRIEVER, PROGRESS_RETRIEVING_CONTEXT,
};
use crate::request::QuestionQuery;
use crate::retriever::Retriever;
use crate::tools::EventSink;

pub(super) async fn run(
    retriever: &dyn Retriever,
    providers: &ProviderRegistry,
    query: QuestionQuery,
    sink: &EventSink,
) -> Result<(), ToolError> {
    let QuestionQuery {
        target,
        question,
        provider,
        model,
    } = query;

    sink.progress(PROGRESS_PREPARING_RETRIEVER, Map::new()).await?;
    retriever.prepare(&target).await?;

    sink.progress(PROGRESS_RETRIEVING_CONTEXT, Map::new()).await?;
    let context = retriever.retrieve(&target, &question).await?;

    let mut detail = Map::new();
    detail.insert("context_documents".to_string(), json!(context.len()));
    sink.progress(PROGRESS_GENERATING_ANSWER, detail).await?;

    let adapter = providers.resolve(&provider)?;
    tracing::debug!(
        provider = %provider,
        model = model.as_deref().unwrap_or("default"),
        context_documents = context.len(),
        "generating answer"
    );
    let request = GenerationRequest {
        system_prompt: repository_system_prompt(&target.repo_type, &target.repo_url, &target.language),
        question,
        context,
        model,
    };

    let mut fragments = adapter.generate(request);
    while let Some(fragment) = fragments.next().await {
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(fragment?));
        sink.data(payload).await?;
    }
    Ok(())
}
