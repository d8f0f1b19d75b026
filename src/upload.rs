use std::{path::Path, sync::Arc};

use teloxide::{net::Download, prelude::Requester, types::Message, Bot};
use thiserror::Error;
use tracing::instrument;

use crate::{
    config::Config,
    database::connection::QuestionQueue,
    parser::{parse_questions, ParseReport},
    HandlerResult,
};

/// Errors listed in a single upload reply.
const SHOWN_ERRORS: usize = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("unsupported file type, send one of: {0}")]
    UnsupportedExtension(String),
    #[error("the file is empty")]
    Empty,
    #[error("the file is neither UTF-8 nor Windows-1256 text")]
    Undecodable,
    #[error("the PDF could not be read: {0}")]
    UnreadablePdf(String),
    #[error("the PDF has no extractable text")]
    NoPdfText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    allowed_extensions: Vec<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["txt".to_owned()],
        }
    }
}

impl UploadSettings {
    /// Comma separated, leading dots and case ignored.
    pub fn from_list(raw: &str) -> Self {
        let allowed_extensions: Vec<String> = raw
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        if allowed_extensions.is_empty() {
            return Self::default();
        }
        Self { allowed_extensions }
    }

    pub fn accepts(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn check(&self, file_name: &str) -> Result<(), UploadError> {
        if self.accepts(file_name) {
            Ok(())
        } else {
            Err(UploadError::UnsupportedExtension(
                self.allowed_extensions
                    .iter()
                    .map(|ext| format!(".{}", ext))
                    .collect::<Vec<_>>()
                    .join(", "),
            ))
        }
    }
}

fn is_pdf(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Text of an uploaded file. PDFs go through the text extractor, anything else
/// through [`decode_upload`].
pub async fn extract_text(file_name: &str, bytes: Vec<u8>) -> Result<String, UploadError> {
    if !is_pdf(file_name) {
        return decode_upload(&bytes);
    }

    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| UploadError::UnreadablePdf(e.to_string()))?
        .map_err(|e| UploadError::UnreadablePdf(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(UploadError::NoPdfText);
    }
    Ok(text)
}

/// UTF-8 first, then the legacy Arabic code page.
pub fn decode_upload(bytes: &[u8]) -> Result<String, UploadError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.contains(&0) {
        return Err(UploadError::Undecodable);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_owned()),
        Err(_) => encoding_rs::WINDOWS_1256
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or(UploadError::Undecodable),
    }
}

pub fn format_upload_report(report: &ParseReport, queued: usize) -> String {
    if report.is_empty() {
        return "❌ No questions found in the file.".to_owned();
    }

    let mut text = if queued == 0 {
        format!(
            "❌ None of the {} blocks is a valid question.",
            report.errors.len()
        )
    } else {
        format!("✅ Queued {} questions.", queued)
    };

    if !report.errors.is_empty() {
        text.push_str(&format!("\n\n⚠️ Skipped {} blocks:", report.errors.len()));
        for error in report.errors.iter().take(SHOWN_ERRORS) {
            text.push_str(&format!("\n• {}", error));
        }
        if report.errors.len() > SHOWN_ERRORS {
            text.push_str(&format!("\n… and {} more", report.errors.len() - SHOWN_ERRORS));
        }
    }

    text
}

#[instrument(level = "info", skip_all)]
pub(crate) async fn receive_upload<S: QuestionQueue>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(document) = msg.document() else {
        return Ok(());
    };
    let file_name = document.file_name.clone().unwrap_or_default();
    log::info!("Received upload '{}' in chat {}", file_name, msg.chat.id);

    if let Err(e) = config.upload.check(&file_name) {
        bot.send_message(msg.chat.id, format!("❌ {}", e)).await?;
        return Ok(());
    }

    let file = bot.get_file(document.file.id.clone()).await?;
    let mut contents = Vec::new();
    bot.download_file(&file.path, &mut contents).await?;

    let text = match extract_text(&file_name, contents).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Rejected upload '{}': {}", file_name, e);
            bot.send_message(msg.chat.id, format!("❌ {}", e)).await?;
            return Ok(());
        }
    };

    let report = parse_questions(&text, &config.parser);
    let queued = report.questions.len();
    log::info!(
        "Parsed '{}': {} questions, {} rejected blocks",
        file_name,
        queued,
        report.errors.len()
    );

    if queued > 0 {
        if let Err(e) = store.enqueue_questions(report.questions.clone()).await {
            log::error!("Database error: {:?}", e);
            bot.send_message(msg.chat.id, format!("⚠️ Saving the questions failed: {}", e))
                .await?;
            return Ok(());
        }
    }

    bot.send_message(msg.chat.id, format_upload_report(&report, queued))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserSettings;

    #[test]
    fn extensions_are_matched_case_insensitively() {
        let settings = UploadSettings::from_list(".TXT, csv");

        assert!(settings.accepts("quiz.txt"));
        assert!(settings.accepts("quiz.Csv"));
        assert!(!settings.accepts("quiz.pdf"));
        assert!(!settings.accepts("txt"));
        assert_eq!(
            settings.check("quiz.pdf"),
            Err(UploadError::UnsupportedExtension(".txt, .csv".to_owned()))
        );
    }

    #[test]
    fn utf8_is_decoded_and_bom_dropped() {
        let bytes = "\u{feff}س: سؤال".as_bytes();
        assert_eq!(decode_upload(bytes).unwrap(), "س: سؤال");
    }

    #[test]
    fn windows_1256_is_the_fallback() {
        // "س: نعم" in Windows-1256.
        let bytes = [0xD3, b':', b' ', 0xE4, 0xDA, 0xE3];
        assert_eq!(decode_upload(&bytes).unwrap(), "س: نعم");
    }

    #[test]
    fn binary_and_empty_files_are_rejected() {
        assert_eq!(decode_upload(&[0x89, b'P', b'N', b'G', 0, 0]), Err(UploadError::Undecodable));
        assert_eq!(decode_upload(b""), Err(UploadError::Empty));
    }

    /// Single page, Helvetica, one text line per entry.
    fn one_page_pdf(lines: &[&str]) -> Vec<u8> {
        let mut content = String::from("BT /F1 12 Tf 72 720 Td\n");
        for line in lines {
            let escaped = line
                .replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)");
            content.push_str(&format!("({}) Tj 0 -24 Td\n", escaped));
        }
        content.push_str("ET");

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_owned(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_owned(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_owned(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_owned(),
        ];

        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, object) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
        }
        let xref = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{:010} 00000 n \n", offset));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        ));

        pdf.into_bytes()
    }

    #[tokio::test]
    async fn pdf_uploads_are_parsed_from_their_text() {
        let pdf = one_page_pdf(&["Q: What is 2+2?", "A) 3", "B) 4", "Ans: 2"]);

        let text = extract_text("quiz.PDF", pdf).await.unwrap();
        let report = parse_questions(&text, &ParserSettings::default());

        assert!(report.errors.is_empty(), "{:?} from {:?}", report.errors, text);
        assert_eq!(report.questions[0].prompt(), "What is 2+2?");
        assert_eq!(report.questions[0].options(), ["3", "4"]);
        assert_eq!(report.questions[0].correct_index(), 1);
    }

    #[tokio::test]
    async fn broken_pdf_is_rejected_and_text_files_are_decoded() {
        assert!(matches!(
            extract_text("quiz.pdf", b"not a pdf".to_vec()).await,
            Err(UploadError::UnreadablePdf(_))
        ));
        assert_eq!(
            extract_text("quiz.txt", b"Q: ok".to_vec()).await.unwrap(),
            "Q: ok"
        );
    }

    #[test]
    fn report_distinguishes_partial_and_total_failure() {
        let settings = ParserSettings::default();

        let partial = parse_questions("Q: a\nA) x\nB) y\nAns: 1\n---\nQ: b\nA) x\n", &settings);
        let text = format_upload_report(&partial, 1);
        assert!(text.starts_with("✅ Queued 1 questions."));
        assert!(text.contains("Block #2: expected at least 2 options, found 1"));

        let none = parse_questions("Q: b\nA) x\n", &settings);
        assert!(format_upload_report(&none, 0).starts_with("❌ None of the 1 blocks"));

        let empty = parse_questions("just prose\n", &settings);
        assert_eq!(format_upload_report(&empty, 0), "❌ No questions found in the file.");
    }
}
