pub mod anonymization_preview;
