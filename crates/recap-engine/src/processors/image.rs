use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use recap_core::{CompletionRequest, CompletionService, ContentTag};

use super::{complete_blob, Processor, ProcessorBatch, ProcessorOptions};
use crate::error::ProcessorError;

const SYSTEM: &str = "You describe images shared in a group chat so they can be mentioned in a \
summary. For each image give one brief sentence on what it shows, using its caption when the \
image itself is not attached. Reply with a plain bulleted list in message order.";

/// Brief descriptions of shared images.
pub struct ImageProcessor {
    service: Arc<dyn CompletionService>,
    options: ProcessorOptions,
}

impl ImageProcessor {
    pub fn new(service: Arc<dyn CompletionService>, options: ProcessorOptions) -> Self {
        Self { service, options }
    }

    pub fn render(batch: &ProcessorBatch, options: &ProcessorOptions) -> CompletionRequest {
        let mut prompt = String::from("Shared images:\n");
        let mut images = Vec::new();
        for record in &batch.records {
            let caption = record.body().trim();
            let caption = if caption.is_empty() { "(no caption)" } else { caption };
            match &record.image_url {
                Some(url) => {
                    images.push(url.clone());
                    let _ = writeln!(
                        prompt,
                        "- image {} from {}: {caption}",
                        images.len(),
                        record.sender
                    );
                }
                None => {
                    let _ = writeln!(prompt, "- unattached image from {}: {caption}", record.sender);
                }
            }
        }
        CompletionRequest::new(SYSTEM, prompt, options.max_tokens)
            .with_model(options.model.clone())
            .with_images(images)
    }
}

#[async_trait]
impl Processor for ImageProcessor {
    fn tag(&self) -> ContentTag {
        ContentTag::Image
    }

    async fn process(&self, batch: &ProcessorBatch) -> Result<String, ProcessorError> {
        let request = Self::render(batch, &self.options);
        complete_blob(self.service.as_ref(), request, self.options.max_output_chars).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::tests::batch;
    use recap_core::MessageRecord;

    #[test]
    fn attaches_urls_and_captions() {
        let b = batch(
            ContentTag::Image,
            vec![
                MessageRecord::image(1, "alice", Some("the view".into()))
                    .with_image_url("https://cdn.example/a.jpg"),
                MessageRecord::image(2, "bob", None),
            ],
            &[],
        );
        let req = ImageProcessor::render(&b, &ProcessorOptions::default());
        assert_eq!(req.images, vec!["https://cdn.example/a.jpg"]);
        assert!(req.prompt.contains("- image 1 from alice: the view"));
        assert!(req.prompt.contains("- unattached image from bob: (no caption)"));
    }
}
