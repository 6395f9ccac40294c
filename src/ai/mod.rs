mod digest;
mod summarizer;

pub use digest::{DigestGenerator, TemplateDigest};
pub use summarizer::LlmDigestGenerator;
