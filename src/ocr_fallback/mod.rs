pub mod interface;
pub mod tesseract;

pub use interface::FallbackOCRInterface;
pub use tesseract::TesseractOCR;
