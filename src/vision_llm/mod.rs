pub mod interface;
pub mod openai_compatible_llm;
pub mod gemini_llm;
pub mod mock_llm;
pub mod factory;

pub use interface::VisionLLMInterface;
pub use factory::VisionLLMFactory;
