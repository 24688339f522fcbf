//! Wire types for the provider's generate and tags endpoints.

use serde::{Deserialize, Deserializer, Serialize};

/// Sampling temperature sent with every generate request.
pub const TEMPERATURE: f32 = 0.1;

/// A model advertised by the provider catalog (`GET /api/tags`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub modified_at: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
}

/// Body of `GET /api/tags`. A missing or malformed `models` field is an empty catalog.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default, deserialize_with = "lenient_models")]
    pub models: Vec<Model>,
}

fn lenient_models<'de, D>(deserializer: D) -> Result<Vec<Model>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Everything needed to address one model on one provider.
///
/// Built once per conversation and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub base_url: String,
    pub path: String,
    pub system: String,
}

impl GenerationConfig {
    /// Full generate URL. The path is appended verbatim.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE,
        }
    }
}

/// JSON body POSTed to the generate endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub context: Vec<i64>,
    pub options: GenerateOptions,
    pub system: String,
}

impl GenerateRequest {
    pub fn new(config: &GenerationConfig, prompt: &str, context: &[i64]) -> Self {
        Self {
            model: config.model.clone(),
            prompt: prompt.to_string(),
            context: context.to_vec(),
            options: GenerateOptions::default(),
            system: config.system.clone(),
        }
    }
}

/// A response fragment while generation is still running (`done: false`).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PartialResult {
    pub model: String,
    pub created_at: String,
    pub response: String,
}

/// The terminal chunk (`done: true`), carrying the new context buffer and counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FinalResult {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub context: Vec<i64>,
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: u64,
    pub eval_count: u64,
    pub eval_duration: u64,
}

/// One decoded chunk of a generate stream, discriminated solely by `done`.
#[derive(Clone, Debug, PartialEq)]
pub enum IncrementalResult {
    Partial(PartialResult),
    Final(FinalResult),
}

impl IncrementalResult {
    pub fn response(&self) -> &str {
        match self {
            Self::Partial(p) => &p.response,
            Self::Final(f) => &f.response,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Partial(p) => &p.model,
            Self::Final(f) => &f.model,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Final(_))
    }

    /// Decode one NDJSON line. `None` for anything that is not a chunk.
    pub fn from_line(line: &[u8]) -> Option<Self> {
        serde_json::from_slice(line).ok()
    }
}

// Raw shape shared by both variants; `done` is the only required field.
#[derive(Deserialize)]
struct RawChunk {
    done: bool,
    #[serde(default)]
    model: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    context: Vec<i64>,
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    load_duration: u64,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    eval_duration: u64,
}

impl From<RawChunk> for IncrementalResult {
    fn from(raw: RawChunk) -> Self {
        if raw.done {
            Self::Final(FinalResult {
                model: raw.model,
                created_at: raw.created_at,
                response: raw.response,
                context: raw.context,
                total_duration: raw.total_duration,
                load_duration: raw.load_duration,
                prompt_eval_count: raw.prompt_eval_count,
                eval_count: raw.eval_count,
                eval_duration: raw.eval_duration,
            })
        } else {
            Self::Partial(PartialResult {
                model: raw.model,
                created_at: raw.created_at,
                response: raw.response,
            })
        }
    }
}

impl<'de> Deserialize<'de> for IncrementalResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawChunk::deserialize(deserializer).map(Into::into)
    }
}
