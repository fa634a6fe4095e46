use crate::cache::{CacheKey, WikiCache, WikiContents};
use crate::error::ToolError;
use crate::tools::EventSink;

/// Streams one page, or every page of the structure in reading order.
pub(super) async fn run(
    cache: &dyn WikiCache,
    key: &CacheKey,
    page_id: Option<&str>,
    sink: &EventSink,
) -> Result<(), ToolError> {
    if let Some(page_id) = page_id {
        let page = cache
            .page(key, page_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("Page '{page_id}' not found")))?;
        return sink.data_record(&page).await;
    }

    let WikiContents {
        structure,
        mut pages,
    } = cache.contents(key).await?.ok_or_else(|| {
        ToolError::NotFound(format!("no cached structure for {}", key.display_name()))
    })?;
    for page_id in structure.page_ids() {
        let page = pages.remove(&page_id).ok_or_else(|| {
            ToolError::NotFound(format!(
                "Page '{page_id}' is listed in the structure of {} but not cached",
                key.display_name()
            ))
        })?;
        sink.data_record(&page).await?;
    }
    Ok(())
}
