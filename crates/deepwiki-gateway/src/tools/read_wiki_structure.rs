use crate::cache::{CacheKey, WikiCache};
use crate::error::ToolError;
use crate::tools::EventSink;

pub(super) async fn run(
    cache: &dyn WikiCache,
    key: &CacheKey,
    sink: &EventSink,
) -> Result<(), ToolError> {
    let structure = cache.structure(key).await?.ok_or_else(|| {
        ToolError::NotFound(format!("no cached structure for {}", key.display_name()))
    })?;
    sink.data_record(&structure).await
}
