// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly: persona, house rules, sample exchanges, then history.

use dmpilot_core::persona::PersonaSettings;
use dmpilot_core::types::ChatMessage;

/// Follower openers the tenant writes sample replies for, keyed
/// `conv_example_{n}`. A sample reply is stored as
/// `conv_example_{n}_reply_{m}` and pairs with the m-th opener.
const SAMPLE_EXCHANGES: [(&str, [&str; 3]); 4] = [
    (
        "conv_example_1",
        [
            "hey, just wanted to say I really liked your last post, how did you pull that off",
            "nice, thanks for the explanation, do you have more stuff like that coming soon",
            "cool, appreciate you taking the time to answer, keep doing your thing",
        ],
    ),
    (
        "conv_example_2",
        [
            "idk why but your content helped a lot today, been going through some stuff",
            "thanks, really means something right now, I've just been overwhelmed lately",
            "anyway I don't wanna keep you, hope everything's good on your side too",
        ],
    ),
    (
        "conv_example_3",
        [
            "hey quick question, do you ever do shoutouts or promos",
            "ah ok cool, how does it usually work for you",
            "got it, thanks for clearing that up, keep doing your thing",
        ],
    ),
    (
        "conv_example_4",
        [
            "yo I saw something in one of your older posts, do you still do stuff like that",
            "nice, where can I check some of the new things you've been doing",
            "sweet, I'll look through it later, thanks for the quick answer",
        ],
    ),
];

const RULES: &[&str] = &[
    "Stay in character at all times. Never say or hint that replies are automated.",
    "Mirror the follower's tone, energy, slang, emojis, and message length.",
    "Keep replies to one or two short sentences. No paragraphs.",
    "You are not an assistant. Only give help or tips when the follower asks for them.",
    "Let the follower lead. Do not push new topics or drag out a chat they are wrapping up.",
    "Do not repeat information you already gave.",
    "Text like a real person: no lists, no templates, no em dashes or double hyphens.",
    "Share a promo link at most once every three exchanges. If you shared one recently, wait.",
    "Prefer short statements over questions. Do not ask questions just to keep the chat going.",
    "Never reuse an opener, phrase, or sign-off from your last two replies. Vary wording and structure.",
    "Take cues from the follower's words, interests, and mood so the reply answers them, not a script.",
];

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().unwrap_or(default)
}

fn join_or_none(items: Vec<String>) -> String {
    if items.is_empty() {
        "none provided".to_string()
    } else {
        items.join(", ")
    }
}

/// The system prompt for one connection's persona.
pub fn system_prompt(persona: &PersonaSettings) -> String {
    let mut out = String::with_capacity(2048);

    let name = or_default(&persona.bot_name, "you");
    let mut identity = format!("You are {name}");
    if let Some(age) = &persona.bot_age {
        identity.push_str(&format!(", {age} years old"));
    }
    if let Some(occupation) = &persona.bot_occupation {
        identity.push_str(&format!(", {occupation}"));
    }
    if let Some(location) = &persona.bot_location {
        identity.push_str(&format!(", from {location}"));
    }
    out.push_str(&identity);
    out.push_str(".\n");
    if let Some(about) = &persona.bot_personality {
        out.push_str(&format!("About you: {about}\n"));
    }

    out.push_str("\nRules:\n");
    for (i, rule) in RULES.iter().enumerate() {
        out.push_str(&format!("{}. {rule}\n", i + 1));
    }

    if let Some(topics) = &persona.avoid_topics {
        out.push_str(&format!(
            "\nAvoid these topics: {topics}. If the follower raises them, steer away in your own voice.\n"
        ));
    }

    let links = persona
        .links
        .iter()
        .map(|l| match &l.title {
            Some(title) => format!("{title}: {}", l.url),
            None => l.url.clone(),
        })
        .collect();
    let posts = persona
        .posts
        .iter()
        .map(|p| p.description.clone())
        .collect();
    out.push_str("\nMention your content only when it fits naturally.\n");
    out.push_str(&format!("Promo links: {}\n", join_or_none(links)));
    out.push_str(&format!("Posts: {}\n", join_or_none(posts)));

    let samples = sample_conversations(persona);
    if !samples.is_empty() {
        out.push_str(
            "\nThese example conversations are your style guide. Match their length, tone, and phrasing:\n\n",
        );
        out.push_str(&samples.join("\n\n"));
        out.push('\n');
    }

    out.push_str(&format!(
        "\nReply as {name} with a single message that answers only the follower's latest message."
    ));
    out
}

/// Sample exchanges for which the tenant wrote at least one reply.
fn sample_conversations(persona: &PersonaSettings) -> Vec<String> {
    SAMPLE_EXCHANGES
        .iter()
        .filter_map(|(key, openers)| {
            let lines: Vec<String> = openers
                .iter()
                .enumerate()
                .filter_map(|(i, opener)| {
                    let reply_key = format!("{key}_reply_{}", i + 1);
                    persona
                        .conversation_samples
                        .get(&reply_key)
                        .filter(|r| !r.trim().is_empty())
                        .map(|reply| format!("Follower: \"{opener}\"\nYou: \"{}\"", reply.trim()))
                })
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        })
        .collect()
}

/// System prompt followed by the conversation history, oldest first.
pub fn build_messages(persona: &PersonaSettings, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system_prompt(persona)));
    messages.extend(history.into_iter().filter(|m| !m.content.trim().is_empty()));
    messages
}
