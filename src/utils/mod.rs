pub mod anonymizer;
