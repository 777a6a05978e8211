use crate::config::{DISCORD_EMBED_FIELD_LIMIT, DISCORD_EMBED_LIMIT, DISCORD_EMBED_MAX_FIELDS};
use poise::serenity_prelude as serenity;

/// Width of the boxed text used to quote rich embeds.
const QUOTED_EMBED_WIDTH: usize = 35;

/// The notification sent for a sighting, rendered once and shared by every delivery.
#[derive(Debug, Clone)]
pub struct SightingCard {
    pub url: String,
    pub description: String,
    pub colour: Option<serenity::Colour>,
    pub timestamp: serenity::Timestamp,
    pub author_name: String,
    pub author_icon: String,
    pub footer: String,
    pub fields: Vec<(String, String)>,
}

impl SightingCard {
    pub fn from_message(
        message: &serenity::Message,
        channel_name: Option<&str>,
        colour: Option<serenity::Colour>,
    ) -> Self {
        let mut fields = Vec::new();
        for embed in &message.embeds {
            if embed.kind.as_deref() != Some("rich") {
                continue;
            }
            let boxed = textify_embed(&EmbedText::from(embed), QUOTED_EMBED_WIDTH);
            fields.push(("Embed".to_string(), format!("```\n{}\n```", boxed)));
        }
        for attachment in &message.attachments {
            fields.push(("Attachment".to_string(), attachment.url.clone()));
        }
        fields.truncate(DISCORD_EMBED_MAX_FIELDS);
        for (_, value) in fields.iter_mut() {
            *value = truncate_chars(value, DISCORD_EMBED_FIELD_LIMIT);
        }

        let channel = channel_name.unwrap_or("unknown-channel");

        Self {
            url: message.link(),
            description: truncate_chars(&message.content, DISCORD_EMBED_LIMIT),
            colour,
            timestamp: message.timestamp,
            author_name: message.author.tag(),
            author_icon: message.author.face(),
            footer: format!("#{} • {}", channel, message.author.id),
            fields,
        }
    }

    pub fn to_embed(&self) -> serenity::CreateEmbed {
        let mut embed = serenity::CreateEmbed::new()
            .title("🔗")
            .url(&self.url)
            .description(&self.description)
            .timestamp(self.timestamp)
            .author(serenity::CreateEmbedAuthor::new(&self.author_name).icon_url(&self.author_icon))
            .footer(serenity::CreateEmbedFooter::new(&self.footer));
        if let Some(colour) = self.colour {
            embed = embed.colour(colour);
        }
        for (name, value) in &self.fields {
            embed = embed.field(name, value, false);
        }
        embed
    }
}

/// Plain-text view of a received embed.
#[derive(Debug, Clone, Default)]
pub struct EmbedText {
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub fields: Vec<(String, String)>,
    pub image: Option<String>,
    pub footer: Option<String>,
}

impl From<&serenity::Embed> for EmbedText {
    fn from(embed: &serenity::Embed) -> Self {
        Self {
            title: embed.title.clone(),
            url: embed.url.clone(),
            author: embed.author.as_ref().map(|a| a.name.clone()),
            description: embed.description.clone(),
            thumbnail: embed.thumbnail.as_ref().map(|t| t.url.clone()),
            fields: embed
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect(),
            image: embed.image.as_ref().map(|i| i.url.clone()),
            footer: embed.footer.as_ref().map(|f| f.text.clone()),
        }
    }
}

/// Draws an embed as a box of wrapped text, `width` columns wide inside the border.
pub fn textify_embed(embed: &EmbedText, width: usize) -> String {
    let width = width.max(1);
    let mut paragraphs: Vec<String> = Vec::new();

    let mut heading = embed.title.clone().unwrap_or_default();
    if let Some(url) = &embed.url {
        if !heading.is_empty() {
            heading.push_str(" - ");
        }
        heading.push_str(url);
    }
    if heading.is_empty() {
        heading = embed.author.clone().unwrap_or_default();
    }
    if !heading.is_empty() {
        paragraphs.push(heading);
        paragraphs.push(String::new());
    }

    if let Some(description) = embed.description.as_deref().filter(|d| !d.is_empty()) {
        paragraphs.push(description.to_string());
        paragraphs.push(String::new());
    }
    if let Some(thumbnail) = &embed.thumbnail {
        paragraphs.push(format!("Thumbnail: {}", thumbnail));
        paragraphs.push(String::new());
    }
    for (name, value) in &embed.fields {
        let ends_with_mark = name.ends_with(['!', ')', '}', '-', ':', '.', '?', '%', '$']);
        paragraphs.push(if ends_with_mark {
            name.clone()
        } else {
            format!("{}:", name)
        });
        paragraphs.extend(value.split('\n').map(str::to_string));
        paragraphs.push(String::new());
    }
    if let Some(image) = &embed.image {
        paragraphs.push(format!("Image: {}", image));
        paragraphs.push(String::new());
    }
    if let Some(footer) = &embed.footer {
        paragraphs.push(footer.clone());
        paragraphs.push(String::new());
    }

    let mut lines: Vec<String> = paragraphs
        .iter()
        .flat_map(|p| {
            let wrapped = wrap(p, width);
            if wrapped.is_empty() {
                vec![String::new()]
            } else {
                wrapped
            }
        })
        .collect();
    // The last paragraph always ends in a spacer; the bottom border replaces it.
    lines.pop();

    let rule = "─".repeat(width);
    let mut out = format!("╓─{}─╮", rule);
    for line in lines {
        let pad = width.saturating_sub(line.chars().count());
        out.push_str(&format!("\n║ {}{} │", line, " ".repeat(pad)));
    }
    out.push_str(&format!("\n╙─{}─╯", rule));
    out
}

/// Greedy word wrap. Words longer than `width` are split across lines.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = chars.split_off(width);
            lines.push(chars.into_iter().collect());
            chars = rest;
        }
        if chars.is_empty() {
            continue;
        }

        let needed = if current_len == 0 { chars.len() } else { current_len + 1 + chars.len() };
        if needed > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(chars.iter());
        current_len += chars.len();
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};

    fn mock_message(content: &str) -> serenity::Message {
        let mut msg = serenity::Message::default();
        msg.id = MessageId::new(3);
        msg.channel_id = ChannelId::new(2);
        msg.guild_id = Some(GuildId::new(1));
        msg.author = serenity::User::default();
        msg.author.id = UserId::new(42);
        msg.author.name = "watched".to_string();
        msg.content = content.to_string();
        msg
    }

    #[test]
    fn test_card_from_plain_message() {
        let card = SightingCard::from_message(&mock_message("hello there"), Some("general"), None);

        assert_eq!(card.description, "hello there");
        assert_eq!(card.footer, "#general • 42");
        assert!(card.url.ends_with("/1/2/3"), "url: {}", card.url);
        assert!(card.author_name.starts_with("watched"));
        assert!(card.fields.is_empty());
    }

    #[test]
    fn test_card_truncates_long_content() {
        let content = "x".repeat(DISCORD_EMBED_LIMIT + 50);
        let card = SightingCard::from_message(&mock_message(&content), None, None);

        assert_eq!(card.description.chars().count(), DISCORD_EMBED_LIMIT);
        assert!(card.description.ends_with("..."));
        assert!(card.footer.starts_with("#unknown-channel"));
    }

    #[test]
    fn test_textify_draws_box() {
        let embed = EmbedText {
            title: Some("Release".to_string()),
            url: Some("https://example.com".to_string()),
            description: Some("New version out".to_string()),
            fields: vec![
                ("Version".to_string(), "1.2.3".to_string()),
                ("Notes!".to_string(), "fixes\nmore fixes".to_string()),
            ],
            footer: Some("bot".to_string()),
            ..Default::default()
        };
        let boxed = textify_embed(&embed, 30);
        let lines: Vec<&str> = boxed.lines().collect();

        assert_eq!(lines[0], format!("╓─{}─╮", "─".repeat(30)));
        assert_eq!(*lines.last().unwrap(), format!("╙─{}─╯", "─".repeat(30)));
        assert!(lines[1].starts_with("║ Release - https://example.com"));
        assert!(lines.iter().any(|l| l.starts_with("║ Version: ")));
        assert!(lines.iter().any(|l| l.starts_with("║ Notes! ")));
        assert!(lines.iter().any(|l| l.starts_with("║ more fixes ")));
        // Every body line is padded to the same width
        for line in &lines[1..lines.len() - 1] {
            assert_eq!(line.chars().count(), 30 + 4, "line: {line:?}");
        }
    }

    #[test]
    fn test_textify_falls_back_to_author() {
        let embed = EmbedText {
            author: Some("Someone".to_string()),
            ..Default::default()
        };
        let boxed = textify_embed(&embed, 20);
        assert!(boxed.lines().nth(1).unwrap().starts_with("║ Someone"));
        assert_eq!(boxed.lines().count(), 3);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        assert_eq!(wrap("aaaa bb", 3), vec!["aaa", "a", "bb"]);
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert!(wrap("   ", 5).is_empty());
    }
}
