use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use finvo_core::{ExtractionRequest, InvoiceData, SchemaValidator};
use finvo_document::{Document, DocumentLoader, PageImage};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::error::ExtractionError;
use crate::llm::{ChatMessage, ChatRequest, ContentPart, LlmClient};
use crate::parse::parse_completion;
use crate::prompt::{prepare_document_content, system_prompt, user_prompt};

/// How document content reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Text where OCR or the PDF text layer produced usable text, images otherwise.
    #[default]
    Auto,
    /// Text only.
    Ocr,
    /// Images wherever a page has one; PDF text-layer pages still go as text.
    Vision,
}

impl ExtractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMode::Auto => "auto",
            ExtractionMode::Ocr => "ocr",
            ExtractionMode::Vision => "vision",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ExtractionMode::Auto),
            "ocr" => Ok(ExtractionMode::Ocr),
            "vision" => Ok(ExtractionMode::Vision),
            other => Err(format!("unknown extraction mode '{other}' (expected auto, ocr or vision)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub mode: ExtractionMode,
    /// Fill null totals, dates and payment from OCR hints.
    pub backfill_from_ocr: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 1500,
            mode: ExtractionMode::Auto,
            backfill_from_ocr: true,
        }
    }
}

pub struct ExtractionAgent {
    llm: Arc<dyn LlmClient>,
    loader: DocumentLoader,
    config: AgentConfig,
}

impl ExtractionAgent {
    pub fn new(llm: Arc<dyn LlmClient>, loader: DocumentLoader, config: AgentConfig) -> Self {
        info!(
            model = %config.model,
            temperature = config.temperature,
            mode = %config.mode,
            ocr_backend = loader.ocr_backend(),
            "Extraction agent initialized"
        );
        Self { llm, loader, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    pub fn supported_formats(&self) -> Vec<String> {
        self.loader.supported_formats()
    }

    pub async fn extract_from_file(
        &self,
        path: &Path,
        request: Option<&ExtractionRequest>,
    ) -> Result<InvoiceData, ExtractionError> {
        let start = Instant::now();
        let result = async {
            let documents = self.loader.load_from_path(path).await?;
            let mut data = self.process_documents(&documents, request).await?;
            data.set_metadata("source_file", path.display().to_string());
            self.stamp(&mut data, start, documents.len());
            Ok::<_, ExtractionError>(data)
        }
        .await;

        match &result {
            Ok(data) => info!(
                processing_time = start.elapsed().as_secs_f64(),
                confidence_score = data.confidence_score,
                "File extraction completed"
            ),
            Err(e) => error!(error = %e, "File extraction failed"),
        }
        result
    }

    pub async fn extract_from_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        request: Option<&ExtractionRequest>,
    ) -> Result<InvoiceData, ExtractionError> {
        let start = Instant::now();
        let file_size = bytes.len();
        let result = async {
            let documents = self.loader.load_from_bytes(bytes, filename, None).await?;
            let mut data = self.process_documents(&documents, request).await?;
            data.set_metadata("source_filename", filename);
            data.set_metadata("file_size", file_size);
            self.stamp(&mut data, start, documents.len());
            Ok::<_, ExtractionError>(data)
        }
        .await;

        match &result {
            Ok(data) => info!(
                filename,
                processing_time = start.elapsed().as_secs_f64(),
                confidence_score = data.confidence_score,
                "Bytes extraction completed"
            ),
            Err(e) => error!(filename, error = %e, "Bytes extraction failed"),
        }
        result
    }

    pub async fn extract_from_base64(
        &self,
        data: &str,
        filename: &str,
        request: Option<&ExtractionRequest>,
    ) -> Result<InvoiceData, ExtractionError> {
        let start = Instant::now();
        let result = async {
            let documents = self.loader.load_from_base64(data, filename).await?;
            let mut invoice = self.process_documents(&documents, request).await?;
            invoice.set_metadata("source_filename", filename);
            self.stamp(&mut invoice, start, documents.len());
            Ok::<_, ExtractionError>(invoice)
        }
        .await;

        if let Err(e) = &result {
            error!(filename, error = %e, "Base64 extraction failed");
        }
        result
    }

    /// One completion over every document, validated and post-processed.
    pub async fn process_documents(
        &self,
        documents: &[Document],
        request: Option<&ExtractionRequest>,
    ) -> Result<InvoiceData, ExtractionError> {
        if documents.is_empty() {
            return Err(ExtractionError::NoDocuments);
        }
        let extract_fuel_info = request.map_or(true, |r| r.extract_fuel_info);
        let extract_line_items = request.map_or(true, |r| r.extract_line_items);

        let chat = self.build_request(documents, extract_fuel_info, extract_line_items);
        let reply = self.llm.complete(chat).await?;
        let raw = parse_completion(&reply)?;
        let mut data = self.validate_result(Value::Object(raw))?;

        if !extract_line_items {
            data.items.clear();
        }
        if !extract_fuel_info {
            data.fuel_info = None;
        }

        let backfilled = if self.config.backfill_from_ocr {
            backfill(&mut data, documents)
        } else {
            Vec::new()
        };
        data.set_metadata("extraction_mode", self.config.mode.as_str());
        data.set_metadata("backfilled_fields", backfilled);
        Ok(data)
    }

    pub fn validate_result(&self, value: Value) -> Result<InvoiceData, ExtractionError> {
        SchemaValidator::validate(value).map_err(|e| {
            error!(error = %e, "Result validation failed");
            ExtractionError::Validation(e)
        })
    }

    fn build_request(&self, documents: &[Document], extract_fuel_info: bool, extract_line_items: bool) -> ChatRequest {
        let mut images = Vec::new();
        let rendered: Vec<Document> = documents
            .iter()
            .map(|doc| {
                let content = if self.sends_images(doc) {
                    let first = images.len() + 1;
                    images.extend(doc.images.iter().map(data_url));
                    if doc.images.len() == 1 {
                        format!("[see attached image {first}]")
                    } else {
                        format!("[see attached images {first} to {}]", images.len())
                    }
                } else {
                    doc.content.clone()
                };
                Document {
                    content,
                    metadata: doc.metadata.clone(),
                    ..Default::default()
                }
            })
            .collect();

        let metadata: Vec<_> = documents.iter().map(|d| &d.metadata).collect();
        let text = user_prompt(
            &prepare_document_content(&rendered),
            extract_fuel_info,
            extract_line_items,
            &metadata,
        );

        let mut parts = vec![ContentPart::Text(text)];
        parts.extend(images.into_iter().map(ContentPart::ImageDataUrl));

        ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            json_mode: true,
            messages: vec![ChatMessage::system(system_prompt()), ChatMessage::user(parts)],
        }
    }

    fn sends_images(&self, doc: &Document) -> bool {
        if doc.images.is_empty() {
            return false;
        }
        match self.config.mode {
            ExtractionMode::Ocr => false,
            ExtractionMode::Vision => doc.metadata.get("text_source").and_then(Value::as_str) != Some("pdf_text"),
            ExtractionMode::Auto => !doc.has_usable_text(),
        }
    }

    fn stamp(&self, data: &mut InvoiceData, start: Instant, document_count: usize) {
        data.set_metadata("processing_time", start.elapsed().as_secs_f64());
        data.set_metadata("document_count", document_count);
        data.set_metadata("model_used", self.config.model.as_str());
    }
}

fn data_url(image: &PageImage) -> String {
    format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.data))
}

/// Fill null fields from the first document whose OCR hints carry a value.
/// Returns the names of the fields that were filled.
fn backfill(data: &mut InvoiceData, documents: &[Document]) -> Vec<&'static str> {
    let hints: Vec<_> = documents.iter().filter_map(|d| d.hints.as_ref()).collect();
    if hints.is_empty() {
        return Vec::new();
    }

    let mut filled = Vec::new();
    macro_rules! fill {
        ($field:ident, $hint:ident) => {
            if data.$field.is_none() {
                if let Some(found) = hints.iter().find_map(|h| h.$hint.as_ref()) {
                    data.$field = Some(found.value.clone());
                    filled.push(stringify!($field));
                }
            }
        };
    }
    fill!(total_amount, total);
    fill!(subtotal, subtotal);
    fill!(tax_amount, tax);
    fill!(transaction_date, date);
    fill!(transaction_time, time);
    fill!(payment_method, payment_method);
    fill!(merchant_name, vendor);

    if !filled.is_empty() {
        info!(fields = ?filled, "Backfilled fields from OCR hints");
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use finvo_document::LoaderConfig;
    use finvo_ocr::{MockRecognizer, OcrBackend, OcrPipeline, ReceiptHints, UnavailableRecognizer};
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::io::Cursor;

    const RECEIPT_TEXT: &str = "SHOP MART\nSUBTOTAL 7.44\nTAX 10.00% .074\nTOTAL 8.18\nVISA";

    fn png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(24, 16, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn agent_with(
        reply: &str,
        backend: impl OcrBackend + 'static,
        config: AgentConfig,
    ) -> (ExtractionAgent, Arc<MockLlm>) {
        let llm = Arc::new(MockLlm::new(reply));
        let pipeline = OcrPipeline::new(Box::new(backend) as Box<dyn OcrBackend>);
        let loader = DocumentLoader::new(LoaderConfig::default(), Arc::new(pipeline));
        (ExtractionAgent::new(llm.clone(), loader, config), llm)
    }

    fn full_reply() -> String {
        json!({
            "merchant_name": "Shop Mart",
            "transaction_date": "2024-01-15",
            "total_amount": 8.18,
            "subtotal": 7.44,
            "tax_amount": 0.074,
            "items": [{"item_name": "HAND TOWEL", "unit_price": 2.97, "category": "shopping"}],
            "fuel_info": {"fuel_type": "diesel", "gallons_filled": 10.5},
            "confidence_score": 0.93
        })
        .to_string()
    }

    #[tokio::test]
    async fn bytes_extraction_writes_processing_metadata() {
        let (agent, llm) = agent_with(&full_reply(), MockRecognizer::new(RECEIPT_TEXT), AgentConfig::default());
        let data = agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();

        assert_eq!(data.merchant_name.as_deref(), Some("Shop Mart"));
        assert_eq!(data.total_amount, Some(dec("8.18")));
        assert_eq!(data.items.len(), 1);
        assert_eq!(data.confidence_score, Some(0.93));

        let meta = &data.processing_metadata;
        assert_eq!(meta["source_filename"], "receipt.png");
        assert_eq!(meta["document_count"], 1);
        assert_eq!(meta["model_used"], "gpt-4o");
        assert_eq!(meta["extraction_mode"], "auto");
        assert!(meta["file_size"].as_u64().unwrap() > 0);
        assert!(meta["processing_time"].as_f64().unwrap() >= 0.0);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert!(req.json_mode);
        assert_eq!(req.max_tokens, 1500);
        let user = &req.messages[1];
        assert!(user.text().contains("Document 1 (Metadata: "));
        assert!(user.text().contains("TOTAL 8.18"));
        // OCR text is usable, so auto mode sends no image.
        assert_eq!(user.image_count(), 0);
    }

    #[tokio::test]
    async fn null_financials_are_backfilled_from_ocr() {
        let reply = json!({"merchant_name": "Shop Mart", "items": []}).to_string();
        let (agent, _) = agent_with(&reply, MockRecognizer::new(RECEIPT_TEXT), AgentConfig::default());
        let data = agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();

        assert_eq!(data.total_amount, Some(dec("8.18")));
        assert_eq!(data.subtotal, Some(dec("7.44")));
        assert_eq!(data.tax_amount, Some(dec("0.074")));
        assert_eq!(data.merchant_name.as_deref(), Some("Shop Mart"));

        let filled: Vec<_> = data.processing_metadata["backfilled_fields"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(filled.contains(&"total_amount"));
        assert!(filled.contains(&"subtotal"));
        assert!(filled.contains(&"tax_amount"));
        assert!(!filled.contains(&"merchant_name"));
    }

    #[tokio::test]
    async fn backfill_can_be_disabled() {
        let reply = json!({"merchant_name": "Shop Mart"}).to_string();
        let config = AgentConfig {
            backfill_from_ocr: false,
            ..AgentConfig::default()
        };
        let (agent, _) = agent_with(&reply, MockRecognizer::new(RECEIPT_TEXT), config);
        let data = agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();
        assert_eq!(data.total_amount, None);
        assert_eq!(data.processing_metadata["backfilled_fields"], json!([]));
    }

    #[tokio::test]
    async fn request_flags_clear_items_and_fuel() {
        let (agent, llm) = agent_with(&full_reply(), MockRecognizer::new(RECEIPT_TEXT), AgentConfig::default());
        let mut request = ExtractionRequest::new("receipt.png");
        request.extract_line_items = false;
        request.extract_fuel_info = false;

        let data = agent
            .extract_from_bytes(png(), "receipt.png", Some(&request))
            .await
            .unwrap();
        assert!(data.items.is_empty());
        assert!(data.fuel_info.is_none());

        let text = llm.requests()[0].messages[1].text();
        assert!(text.contains("Extract fuel information: false"));
        assert!(text.contains("Extract line items: false"));
    }

    #[tokio::test]
    async fn vision_mode_attaches_images() {
        let config = AgentConfig {
            mode: ExtractionMode::Vision,
            ..AgentConfig::default()
        };
        let (agent, llm) = agent_with(&full_reply(), MockRecognizer::new(RECEIPT_TEXT), config);
        let data = agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();
        assert_eq!(data.processing_metadata["extraction_mode"], "vision");

        let user = &llm.requests()[0].messages[1];
        assert_eq!(user.image_count(), 1);
        assert!(user.text().contains("[see attached image 1]"));
        assert!(!user.text().contains("TOTAL 8.18"));
        assert!(user
            .parts
            .iter()
            .any(|p| matches!(p, ContentPart::ImageDataUrl(url) if url.starts_with("data:image/png;base64,"))));
    }

    #[tokio::test]
    async fn auto_mode_falls_back_to_image_without_ocr() {
        let (agent, llm) = agent_with(&full_reply(), UnavailableRecognizer, AgentConfig::default());
        agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();
        assert_eq!(llm.requests()[0].messages[1].image_count(), 1);
    }

    #[tokio::test]
    async fn ocr_mode_never_sends_images() {
        let config = AgentConfig {
            mode: ExtractionMode::Ocr,
            ..AgentConfig::default()
        };
        let (agent, llm) = agent_with(&full_reply(), UnavailableRecognizer, config);
        agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();
        assert_eq!(llm.requests()[0].messages[1].image_count(), 0);
    }

    #[tokio::test]
    async fn vision_mode_keeps_pdf_text_pages_as_text() {
        let config = AgentConfig {
            mode: ExtractionMode::Vision,
            ..AgentConfig::default()
        };
        let (agent, llm) = agent_with(&full_reply(), UnavailableRecognizer, config);
        let mut page = Document::new("INVOICE 1001\nSUBTOTAL 7.44\nTOTAL 8.18").with_meta("text_source", "pdf_text");
        page.images.push(PageImage {
            data: png(),
            mime_type: "image/png",
        });

        agent.process_documents(&[page], None).await.unwrap();
        let user = &llm.requests()[0].messages[1];
        assert_eq!(user.image_count(), 0);
        assert!(user.text().contains("INVOICE 1001"));
    }

    #[tokio::test]
    async fn hints_from_later_documents_are_used() {
        let (agent, _) = agent_with("{\"merchant_name\": \"X\"}", UnavailableRecognizer, AgentConfig::default());
        let first = Document::new("page one");
        let mut second = Document::new("page two");
        second.hints = Some(ReceiptHints {
            total: Some(finvo_ocr::ExtractedField::new(dec("42.00"), 0.9)),
            ..Default::default()
        });

        let data = agent.process_documents(&[first, second], None).await.unwrap();
        assert_eq!(data.total_amount, Some(dec("42.00")));
    }

    #[tokio::test]
    async fn model_cannot_write_processing_metadata() {
        let reply = json!({
            "merchant_name": "Shop Mart",
            "total_amount": 8.18,
            "processing_metadata": {"model_used": "spoofed", "injected": "yes"}
        })
        .to_string();
        let (agent, _) = agent_with(&reply, MockRecognizer::new(RECEIPT_TEXT), AgentConfig::default());
        let data = agent.extract_from_bytes(png(), "receipt.png", None).await.unwrap();

        let meta = &data.processing_metadata;
        assert_eq!(meta["model_used"], "gpt-4o");
        assert!(!meta.contains_key("injected"));
    }

    #[tokio::test]
    async fn empty_document_list_is_an_error() {
        let (agent, llm) = agent_with("{}", UnavailableRecognizer, AgentConfig::default());
        let err = agent.process_documents(&[], None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NoDocuments));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_is_an_error() {
        let (agent, _) = agent_with("Sorry, I can't help with that.", UnavailableRecognizer, AgentConfig::default());
        let err = agent
            .process_documents(&[Document::new("TOTAL 8.18")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Completion(_)));
    }

    #[tokio::test]
    async fn invalid_record_is_a_validation_error() {
        let reply = json!({"total_amount": -5, "merchant_name": "Shop"}).to_string();
        let (agent, _) = agent_with(&reply, UnavailableRecognizer, AgentConfig::default());
        let err = agent
            .process_documents(&[Document::new("TOTAL 8.18")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Validation(_)));
    }

    #[tokio::test]
    async fn llm_failure_propagates() {
        let llm = Arc::new(MockLlm::scripted(vec![Err("upstream down")]));
        let loader = DocumentLoader::new(
            LoaderConfig::default(),
            Arc::new(OcrPipeline::new(Box::new(UnavailableRecognizer) as Box<dyn OcrBackend>)),
        );
        let agent = ExtractionAgent::new(llm, loader, AgentConfig::default());
        let err = agent
            .process_documents(&[Document::new("TOTAL 8.18")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Llm(_)));
    }

    #[tokio::test]
    async fn file_and_base64_entry_points() {
        let (agent, _) = agent_with(&full_reply(), MockRecognizer::new(RECEIPT_TEXT), AgentConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, png()).unwrap();
        let data = agent.extract_from_file(&path, None).await.unwrap();
        assert_eq!(data.processing_metadata["source_file"], path.display().to_string());

        let encoded = STANDARD.encode(png());
        let data = agent.extract_from_base64(&encoded, "receipt.png", None).await.unwrap();
        assert_eq!(data.processing_metadata["source_filename"], "receipt.png");
        assert_eq!(data.total_amount, Some(dec("8.18")));
    }

    #[tokio::test]
    async fn unsupported_file_is_a_loader_error() {
        let (agent, _) = agent_with("{}", UnavailableRecognizer, AgentConfig::default());
        let err = agent
            .extract_from_bytes(b"hello".to_vec(), "notes.txt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Loader(_)));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Vision".parse::<ExtractionMode>(), Ok(ExtractionMode::Vision));
        assert_eq!(" ocr ".parse::<ExtractionMode>(), Ok(ExtractionMode::Ocr));
        assert!("magic".parse::<ExtractionMode>().is_err());
        assert_eq!(ExtractionMode::default().to_string(), "auto");
    }
}
