//! Tag derivation from dependencies and summary text.
//!
//! Tags come from two fixed lookup tables: one keyed by normalized package
//! name ([`DEPENDENCY_TAGS`]) and one of domain phrases matched against the
//! summary ([`PHRASE_TAGS`]). README topic markers follow, and any slots
//! still free are filled with keywords pulled from the summary itself
//! ([`keyword_tags`]). Dependency tags always win a slot first when the cap
//! is reached.

use std::collections::{HashMap, HashSet};

use crate::models::{normalize_tag, Dependency};

/// Normalized package name → tags.
pub const DEPENDENCY_TAGS: &[(&str, &[&str])] = &[
    ("torch", &["pytorch", "deep-learning"]),
    ("torchvision", &["pytorch", "computer-vision"]),
    ("torchaudio", &["pytorch", "audio"]),
    ("pytorch-lightning", &["pytorch", "deep-learning"]),
    ("lightning", &["pytorch", "deep-learning"]),
    ("tensorflow", &["tensorflow", "deep-learning"]),
    ("keras", &["keras", "deep-learning"]),
    ("jax", &["jax", "deep-learning"]),
    ("flax", &["jax", "deep-learning"]),
    ("transformers", &["transformers", "nlp"]),
    ("tokenizers", &["nlp"]),
    ("sentence-transformers", &["embeddings", "nlp"]),
    ("diffusers", &["diffusion", "image-generation"]),
    ("accelerate", &["distributed-training"]),
    ("deepspeed", &["distributed-training"]),
    ("peft", &["fine-tuning"]),
    ("trl", &["fine-tuning", "rlhf"]),
    ("bitsandbytes", &["quantization"]),
    ("datasets", &["datasets"]),
    ("timm", &["computer-vision", "pytorch"]),
    ("opencv-python", &["computer-vision"]),
    ("opencv-python-headless", &["computer-vision"]),
    ("pillow", &["image-processing"]),
    ("scikit-image", &["image-processing"]),
    ("scikit-learn", &["machine-learning"]),
    ("xgboost", &["machine-learning"]),
    ("lightgbm", &["machine-learning"]),
    ("pandas", &["data-analysis"]),
    ("gym", &["reinforcement-learning"]),
    ("gymnasium", &["reinforcement-learning"]),
    ("stable-baselines3", &["reinforcement-learning"]),
    ("langchain", &["llm", "agents"]),
    ("llama-index", &["llm", "rag"]),
    ("openai", &["llm"]),
    ("anthropic", &["llm"]),
    ("vllm", &["llm", "inference"]),
    ("openai-whisper", &["speech-recognition"]),
    ("librosa", &["audio"]),
    ("spacy", &["nlp"]),
    ("nltk", &["nlp"]),
    ("faiss-cpu", &["vector-search"]),
    ("faiss-gpu", &["vector-search"]),
    ("chromadb", &["vector-database"]),
    ("torch-geometric", &["graph-neural-networks"]),
    ("networkx", &["graphs"]),
    ("wandb", &["experiment-tracking"]),
    ("mlflow", &["experiment-tracking"]),
    ("ray", &["distributed-computing"]),
    ("gradio", &["demo-ui"]),
    ("streamlit", &["demo-ui"]),
    ("fastapi", &["web", "api"]),
    ("flask", &["web"]),
    ("django", &["web"]),
    ("tokio", &["async", "rust"]),
    ("serde", &["serialization", "rust"]),
    ("clap", &["cli", "rust"]),
    ("axum", &["web", "rust"]),
    ("actix-web", &["web", "rust"]),
    ("react", &["frontend", "react"]),
    ("vue", &["frontend", "vue"]),
    ("next", &["frontend", "react"]),
    ("express", &["web", "nodejs"]),
    ("typescript", &["typescript"]),
];

/// Domain phrase (space-separated lowercase words) → tag.
pub const PHRASE_TAGS: &[(&str, &str)] = &[
    ("vision language", "vision-language-model"),
    ("multimodal", "multimodal"),
    ("multi modal", "multimodal"),
    ("large language model", "llm"),
    ("large language models", "llm"),
    ("llm", "llm"),
    ("llms", "llm"),
    ("machine learning", "machine-learning"),
    ("deep learning", "deep-learning"),
    ("reinforcement learning", "reinforcement-learning"),
    ("computer vision", "computer-vision"),
    ("natural language processing", "nlp"),
    ("nlp", "nlp"),
    ("diffusion", "diffusion"),
    ("image generation", "image-generation"),
    ("object detection", "object-detection"),
    ("segmentation", "segmentation"),
    ("speech recognition", "speech-recognition"),
    ("text to speech", "tts"),
    ("retrieval augmented", "rag"),
    ("rag", "rag"),
    ("embeddings", "embeddings"),
    ("vector database", "vector-database"),
    ("agent", "agents"),
    ("agents", "agents"),
    ("robotics", "robotics"),
    ("time series", "time-series"),
    ("recommendation", "recommender-systems"),
    ("graph neural", "graph-neural-networks"),
    ("quantization", "quantization"),
    ("fine tuning", "fine-tuning"),
    ("finetuning", "fine-tuning"),
    ("command line", "cli"),
    ("cli", "cli"),
    ("compiler", "compiler"),
    ("database", "database"),
    ("kubernetes", "kubernetes"),
];

/// Tags implied by the dependency set, in dependency order.
pub fn dependency_tags(deps: &[Dependency]) -> Vec<String> {
    deps.iter()
        .filter_map(|d| {
            DEPENDENCY_TAGS
                .iter()
                .find(|(name, _)| *name == d.name)
                .map(|(_, tags)| *tags)
        })
        .flatten()
        .map(|t| t.to_string())
        .collect()
}

/// Tags for the domain phrases that occur in `text`, in table order.
pub fn phrase_tags(text: &str) -> Vec<String> {
    let words: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    let haystack = format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "));
    PHRASE_TAGS
        .iter()
        .filter(|(phrase, _)| haystack.contains(&format!(" {} ", phrase)))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

/// Words too generic to carry retrieval signal as a tag.
const KEYWORD_STOPWORDS: &[&str] = &[
    "about", "all", "also", "and", "any", "are", "based", "but", "can", "code", "easy", "for",
    "from", "has", "have", "how", "implementation", "into", "its", "just", "library", "more",
    "new", "not", "official", "one", "our", "over", "package", "project", "provides",
    "repository", "simple", "such", "support", "supports", "than", "that", "the", "their",
    "then", "there", "these", "this", "tool", "use", "used", "uses", "using", "very", "was",
    "were", "what", "when", "which", "while", "will", "with", "written", "you", "your",
];

/// Open-vocabulary keywords of `text`: lowercase words of three or more
/// characters, not all digits, not stopwords. Ranked by frequency, ties by
/// first occurrence.
pub fn keyword_tags(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let words = text
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '+'))
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| {
            w.chars().count() >= 3
                && !w.chars().all(|c| c.is_ascii_digit())
                && !KEYWORD_STOPWORDS.contains(&w.as_str())
        });
    for (position, word) in words.enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));
    ranked.into_iter().map(|(word, _)| word).collect()
}

/// Merge candidate tag lists in priority order: normalized, deduplicated
/// case-insensitively, capped at `max_tags`.
pub fn merge_tags<I>(groups: I, max_tags: usize) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in groups.into_iter().flatten() {
        if out.len() >= max_tags {
            break;
        }
        if let Some(tag) = normalize_tag(&tag) {
            if seen.insert(tag.clone()) {
                out.push(tag);
            }
        }
    }
    out
}

/// Derive the tag set for a record.
pub fn derive_tags(
    deps: &[Dependency],
    summary: &str,
    topics: &[String],
    max_tags: usize,
) -> Vec<String> {
    merge_tags(
        [
            dependency_tags(deps),
            phrase_tags(summary),
            topics.to_vec(),
            keyword_tags(summary),
        ],
        max_tags,
    )
}
