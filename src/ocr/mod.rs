pub mod captured;
pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod recognition;
pub mod setup;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use captured::CapturedImage;
pub use engine::{OcrEngine, OcrOutput, TesseractEngine};
pub use extract::normalize_answer;
pub use preprocess::{preprocess, BackupVariant, Strategy};
pub use recognition::{fuse, RecognitionEngine, RecognitionResult, Recognizer};
pub use strategy::StrategyOrchestrator;
