//! Hosted-model boundary: prompts, reply cleanup, and tolerant parsing for
//! goal extraction and the milestone coach.

use crate::error::{Error, Result};
use crate::goal::NewGoal;
use crate::region::Region;
use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

const REGION_PROMPT: &str = r##"You are looking at a vision board collage. Find the distinct pictures on it and turn each into a goal.

1. Detect visual elements: scan the whole image for separate photos or illustrations with visible borders. Ignore pure text unless it is part of a picture.
2. Map each element to a rectangle in percentages of the image:
   - x: distance from the left edge (0-100)
   - y: distance from the top edge (0-100)
   - width, height: share of the image width/height covered
3. For each element infer the life area it stands for (career, health, wealth, relationships, travel, personal growth, ...) and write:
   - title: an actionable goal of 5-12 words
   - description: one or two sentences on what achieving it looks like

Rules:
- Return between 3 and 10 goals, larger and more prominent pictures first.
- Regions may overlap slightly when pictures overlap; fit them tightly.

Output format:
[{"title":"Achieve financial independence","description":"Build multiple income streams","region":{"x":65,"y":45,"width":30,"height":25}}]

Return ONLY the JSON array. No markdown, no explanation."##;

const CATEGORY_PROMPT: &str = r##"Analyze this vision board image and extract 3-10 goals you can identify from its text, pictures, themes and patterns.

For each goal provide:
- title: short and clear (3-8 words)
- description: what the goal entails (1-2 sentences)
- category: one of Career, Health, Relationships, Finance, Personal, Travel, Education, Lifestyle

Return ONLY a valid JSON object in exactly this shape, with no extra text or markdown:
{"goals": [{"title": "...", "description": "...", "category": "..."}]}"##;

const CHAT_FALLBACK_MESSAGE: &str =
    "I'm having trouble processing that. Could you rephrase your question?";
const CHAT_FALLBACK_REPLIES: [&str; 3] = [
    "Suggest milestones",
    "What's the first step?",
    "Help me prioritize",
];
const CHAT_DEFAULT_REPLIES: [&str; 2] = ["Suggest milestones", "I'm done"];

pub const CATEGORIES: [&str; 8] = [
    "Career",
    "Health",
    "Relationships",
    "Finance",
    "Personal",
    "Travel",
    "Education",
    "Lifestyle",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
}

impl ImageSource {
    /// `http(s)://` strings are URLs, anything else a local path.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub image: Option<ImageSource>,
}

impl ModelRequest {
    /// Single text block handed to models that take one prompt.
    pub fn flattened(&self) -> String {
        let mut out = String::new();
        if let Some(system) = &self.system {
            out.push_str(system.trim());
            out.push_str("\n\n");
        }
        out.push_str(self.prompt.trim());
        out.push('\n');
        if let Some(ImageSource::Url(url)) = &self.image {
            out.push_str("\nImage URL: ");
            out.push_str(url);
            out.push('\n');
        }
        out
    }
}

/// Anything that turns a prompt (plus optional image) into reply text.
pub trait ModelClient {
    fn complete(&self, request: &ModelRequest) -> Result<String>;
}

/// Runs a Codex-style CLI: `<bin> exec --output-last-message <file> [--image <path>] [--model <m>] -`
/// with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CliModel {
    bin: String,
    model: Option<String>,
    timeout: Duration,
    work_dir: PathBuf,
}

impl CliModel {
    pub fn new(bin: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            model: None,
            timeout: Duration::from_secs(120),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    /// Timeouts under ten seconds are raised to ten.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_secs(10));
        self
    }

    fn reply_path(&self) -> PathBuf {
        self.work_dir.join(format!(
            "reply-{}-{}-{}.txt",
            Utc::now().format("%Y%m%d-%H%M%S"),
            std::process::id(),
            rand::thread_rng().gen_range(1000..9999)
        ))
    }
}

impl ModelClient for CliModel {
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        fs::create_dir_all(&self.work_dir).map_err(|err| {
            Error::transport(format!(
                "failed to create model work dir {}: {err}",
                self.work_dir.display()
            ))
        })?;
        let reply_path = self.reply_path();

        let mut cmd = Command::new(&self.bin);
        cmd.arg("exec").arg("--output-last-message").arg(&reply_path);
        if let Some(ImageSource::Path(path)) = &request.image {
            cmd.arg("--image").arg(path);
        }
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("-");
        // the reply comes from the file; the transcript on stdout is not kept
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        debug!(bin = %self.bin, reply = %reply_path.display(), "invoking model");
        let mut child = cmd
            .spawn()
            .map_err(|err| Error::transport(format!("failed to start {}: {err}", self.bin)))?;

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.flattened().as_bytes())
                .map_err(|err| Error::transport(format!("failed to send prompt: {err}")))?;
        }

        let status = child.wait_timeout(self.timeout).map_err(Error::transport)?;
        let Some(status) = status else {
            let _ = child.kill();
            let _ = child.wait();
            let _ = fs::remove_file(&reply_path);
            return Err(Error::transport(format!(
                "{} timed out after {}s",
                self.bin,
                self.timeout.as_secs()
            )));
        };
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let reply = fs::read_to_string(&reply_path).unwrap_or_default();
        let _ = fs::remove_file(&reply_path);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(Error::transport(format!(
                "{} exited with status {}: {}",
                self.bin,
                status.code().unwrap_or(1),
                truncate_text(stderr.trim(), 400)
            )));
        }
        if reply.trim().is_empty() {
            return Err(Error::malformed("model produced an empty reply"));
        }
        Ok(reply)
    }
}

/// Drops Markdown code fences models like to wrap JSON in.
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn parse_json(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(&cleaned).map_err(|err| {
        Error::malformed(format!(
            "reply is not JSON ({err}): {}",
            truncate_text(&cleaned, 200)
        ))
    })
}

/// A goal located on the board image.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExtractedGoal {
    pub title: String,
    pub description: String,
    pub region: Region,
}

impl ExtractedGoal {
    pub fn into_new_goal(self, vision_board_id: &str) -> NewGoal {
        NewGoal {
            vision_board_id: vision_board_id.to_string(),
            title: self.title,
            description: self.description,
            category: None,
            region: self.region,
        }
    }
}

/// A goal read off the board without a location.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategorizedGoal {
    pub title: String,
    pub description: String,
    pub category: String,
}

/// Accepts a bare array or `{"goals": [...]}`. Entries without a title or a
/// usable region are skipped; regions are fitted onto the image.
pub fn parse_region_goals(raw: &str) -> Result<Vec<ExtractedGoal>> {
    let value = parse_json(raw)?;
    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("goals")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::malformed("reply object has no 'goals' array"))?,
        _ => return Err(Error::malformed("reply must be a JSON array of goals")),
    };

    let goals: Vec<ExtractedGoal> = entries.iter().filter_map(region_goal_from).collect();
    if goals.is_empty() {
        return Err(Error::malformed(format!(
            "none of the {} returned goals were usable",
            entries.len()
        )));
    }
    if goals.len() < entries.len() {
        warn!(
            kept = goals.len(),
            dropped = entries.len() - goals.len(),
            "skipped malformed goal entries"
        );
    }
    Ok(goals)
}

fn region_goal_from(entry: &Value) -> Option<ExtractedGoal> {
    let obj = entry.as_object()?;
    let title = non_empty_str(obj.get("title"))?;
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let region = obj.get("region")?.as_object()?;
    let raw = Region {
        x: value_to_f64(region.get("x"))?,
        y: value_to_f64(region.get("y"))?,
        width: value_to_f64(region.get("width"))?,
        height: value_to_f64(region.get("height"))?,
    };
    Some(ExtractedGoal {
        title,
        description,
        region: raw.fitted_to_image()?,
    })
}

/// Requires `{"goals": [...]}` with string title, description and category.
pub fn parse_category_goals(raw: &str) -> Result<Vec<CategorizedGoal>> {
    let value = parse_json(raw)?;
    let entries = value
        .get("goals")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::malformed("Invalid response format from AI"))?;

    let goals: Vec<CategorizedGoal> = entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let category = non_empty_str(obj.get("category"))?;
            // known categories get their canonical spelling; others pass through
            let category = CATEGORIES
                .iter()
                .find(|c| c.eq_ignore_ascii_case(&category))
                .map(|c| c.to_string())
                .unwrap_or(category);
            Some(CategorizedGoal {
                title: non_empty_str(obj.get("title"))?,
                description: non_empty_str(obj.get("description"))?,
                category,
            })
        })
        .collect();
    if goals.is_empty() {
        return Err(Error::malformed(
            "No valid goals extracted from the vision board",
        ));
    }
    Ok(goals)
}

pub fn extract_region_goals<C: ModelClient + ?Sized>(
    client: &C,
    image: ImageSource,
) -> Result<Vec<ExtractedGoal>> {
    let reply = client.complete(&ModelRequest {
        system: None,
        prompt: REGION_PROMPT.to_string(),
        image: Some(image),
    })?;
    let goals = parse_region_goals(&reply)?;
    info!(count = goals.len(), "goals extracted from board");
    Ok(goals)
}

pub fn analyze_board<C: ModelClient + ?Sized>(
    client: &C,
    image: ImageSource,
) -> Result<Vec<CategorizedGoal>> {
    let reply = client.complete(&ModelRequest {
        system: None,
        prompt: CATEGORY_PROMPT.to_string(),
        image: Some(image),
    })?;
    parse_category_goals(&reply)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRequest {
    pub goal_title: String,
    pub goal_description: String,
    pub existing_milestones: Vec<String>,
    pub user_message: Option<String>,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    #[serde(default)]
    pub suggested_milestones: Vec<String>,
    #[serde(default)]
    pub quick_replies: Vec<String>,
}

impl ChatReply {
    /// Shown whenever the coach cannot be reached or answers garbage.
    pub fn fallback() -> Self {
        Self {
            message: CHAT_FALLBACK_MESSAGE.to_string(),
            suggested_milestones: Vec::new(),
            quick_replies: CHAT_FALLBACK_REPLIES.iter().map(ToString::to_string).collect(),
        }
    }
}

pub fn chat_system_prompt(request: &ChatRequest) -> String {
    let milestones = if request.existing_milestones.is_empty() {
        "None yet".to_string()
    } else {
        request
            .existing_milestones
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}. {m}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut out = String::new();
    out.push_str("You are a goal-setting coach. Help the user break their goal into concrete, achievable milestones.\n\n");
    out.push_str("CURRENT GOAL:\n");
    out.push_str(&format!("Title: {}\n", request.goal_title));
    out.push_str(&format!("Description: {}\n\n", request.goal_description));
    out.push_str("EXISTING MILESTONES:\n");
    out.push_str(&milestones);
    out.push_str("\n\n");
    out.push_str("Guidelines:\n");
    out.push_str("1) Suggest 3-5 specific, measurable milestones, ordered from first step to last\n");
    out.push_str("2) Always offer 3 short quick replies that move the conversation forward\n");
    out.push_str("3) Keep the message to 2-3 encouraging sentences\n\n");
    out.push_str("Respond with a JSON object:\n");
    out.push_str("{\"message\": \"...\", \"suggestedMilestones\": [\"...\"], \"quickReplies\": [\"...\", \"...\", \"...\"]}\n");
    out.push_str("suggestedMilestones is optional and only present when you propose milestones.\n");
    out
}

pub fn chat_user_prompt(request: &ChatRequest) -> String {
    let message = request
        .user_message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());
    let Some(message) = message else {
        return "This is the first message. Greet the user and offer to help them create milestones for their goal. Provide your response as JSON.".to_string();
    };

    let history = request
        .history
        .iter()
        .map(|turn| {
            let who = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{who}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut out = String::new();
    if !history.is_empty() {
        out.push_str(&history);
        out.push_str("\n\n");
    }
    out.push_str(&format!("User: {message}\n\nProvide your response as JSON."));
    out
}

pub fn parse_chat_reply(raw: &str) -> Result<ChatReply> {
    let value = parse_json(raw)?;
    let message = non_empty_str(value.get("message"))
        .ok_or_else(|| Error::malformed("chat reply has no message"))?;
    let strings = |key: &str| -> Option<Vec<String>> {
        value.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|v| non_empty_str(Some(v)))
                .collect()
        })
    };
    Ok(ChatReply {
        message,
        suggested_milestones: strings("suggestedMilestones").unwrap_or_default(),
        quick_replies: strings("quickReplies")
            .unwrap_or_else(|| CHAT_DEFAULT_REPLIES.iter().map(ToString::to_string).collect()),
    })
}

/// Never fails: any transport or parse problem becomes [`ChatReply::fallback`].
pub fn milestone_chat<C: ModelClient + ?Sized>(client: &C, request: &ChatRequest) -> ChatReply {
    let model_request = ModelRequest {
        system: Some(chat_system_prompt(request)),
        prompt: chat_user_prompt(request),
        image: None,
    };
    match client
        .complete(&model_request)
        .and_then(|reply| parse_chat_reply(&reply))
    {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, "milestone chat fell back to canned reply");
            ChatReply::fallback()
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Numbers, numeric strings, and `"NN%"` strings.
fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn truncate_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect::<String>() + "...<truncated>"
}

/// True when `path` looks like a board image the model CLI can attach.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "gif"))
        .unwrap_or(false)
}
