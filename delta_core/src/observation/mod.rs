pub mod extractor;
pub mod observation;
