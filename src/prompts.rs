//! Prompts for the two model calls of the intake pipeline.
//!
//! Keeping every prompt here means a wording change touches one file, and
//! tests can assert on the exact text the model receives.
//!
//! Callers can override the extraction instruction via
//! [`crate::config::IntakeConfig::extraction_prompt`]; the reconciliation
//! prompt is always built from the template.

/// Instruction sent ahead of the page images in the extraction call.
pub const EXTRACTION_INSTRUCTION: &str = "Extract all information from the document in JSON format";

/// Preamble of the reconciliation system prompt; the template text follows it.
pub const RECONCILIATION_PREAMBLE: &str = "You are an AI assistant specialized in extracting information from a document. \
Please analyze the provided text and extract information in the following JSON format: \
replace the <value> with actual value and keep field blank if value is not found. \
Return the full structure given below:\n";

/// Build the reconciliation system prompt around the literal template text.
pub fn reconciliation_system_prompt(template_text: &str) -> String {
    format!("{RECONCILIATION_PREAMBLE}{template_text}")
}

/// Build the reconciliation user message carrying the extracted data.
pub fn reconciliation_user_message(extracted: &str) -> String {
    format!("Please extract the information from the following text:\n\n{extracted}")
}

/// Build the extraction user text for text-only evidence.
pub fn text_evidence_message(instruction: &str, document_text: &str) -> String {
    format!("{instruction}\n\n\"\"\"{document_text}\"\"\"")
}
