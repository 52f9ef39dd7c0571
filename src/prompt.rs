//! Prompt assembly
//!
//! Every turn replays the whole transcript; nothing is truncated. Photos are
//! reduced to a text block before they reach the transcript.

use crate::config::{IMAGE_CAPTION_PLACEHOLDER, VISION_PROMPT};
use crate::llm::{ImageInput, LlmClient, LlmError};
use crate::transcript::{Message, Transcript};
use tracing::debug;

/// Append the user's message
pub fn append_user_turn(transcript: &mut Transcript, content: impl Into<String>) {
    transcript.push(Message::user(content));
}

/// Append the model's raw reply
pub fn append_assistant_turn(transcript: &mut Transcript, content: impl Into<String>) {
    transcript.push(Message::assistant(content));
}

/// Text block standing in for a photo in the transcript
#[must_use]
pub fn compose_image_turn(caption: Option<&str>, description: &str) -> String {
    let caption = caption
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(IMAGE_CAPTION_PLACEHOLDER);
    format!("[Image] {caption}\n[Image description] {}", description.trim())
}

/// Describe `image` with the vision model and append the combined block as a
/// single user turn. The transcript is left untouched on failure.
///
/// # Errors
///
/// Returns an error if the vision call fails.
pub async fn append_image_turn(
    transcript: &mut Transcript,
    llm: &LlmClient,
    caption: Option<&str>,
    image: ImageInput,
) -> Result<(), LlmError> {
    let description = llm.describe_image(VISION_PROMPT, &[image]).await?;
    debug!("Image description: {} chars", description.len());
    append_user_turn(transcript, compose_image_turn(caption, &description));
    Ok(())
}

/// Messages sent to the chat model: the whole transcript, seed first
#[must_use]
pub fn to_chat_messages(transcript: &Transcript) -> &[Message] {
    transcript.messages()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;
    use crate::transcript::Role;
    use std::sync::Arc;

    #[test]
    fn test_user_and_assistant_turns_append_in_order() {
        let mut t = Transcript::seeded("seed");
        append_user_turn(&mut t, "hi");
        append_assistant_turn(&mut t, "\\waves\\ hello");

        let roles: Vec<Role> = to_chat_messages(&t).iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(t.messages()[2].content, "\\waves\\ hello");
    }

    #[test]
    fn test_image_turn_with_caption() {
        assert_eq!(
            compose_image_turn(Some("my dog"), "A brown dog on grass."),
            "[Image] my dog\n[Image description] A brown dog on grass."
        );
    }

    #[test]
    fn test_image_turn_without_caption_uses_placeholder() {
        let expected = "[Image] (no caption)\n[Image description] A cat.";
        assert_eq!(compose_image_turn(None, "A cat."), expected);
        assert_eq!(compose_image_turn(Some("   "), "A cat."), expected);
    }

    #[tokio::test]
    async fn test_append_image_turn_adds_single_user_message() {
        let mut vision = MockLlmProvider::new();
        vision
            .expect_describe_image()
            .withf(|prompt, images, _, _| prompt == VISION_PROMPT && images.len() == 1)
            .times(1)
            .returning(|_, _, _, _| Ok("A sunset over water.".to_string()));
        let llm = LlmClient::with_providers(None, "chat", Some(Arc::new(vision)), "vision");

        let mut t = Transcript::seeded("seed");
        append_image_turn(&mut t, &llm, Some("look"), ImageInput::jpeg(vec![1, 2]))
            .await
            .expect("vision should succeed");

        assert_eq!(t.len(), 2);
        let last = t.last().expect("last message");
        assert_eq!(last.role, Role::User);
        assert_eq!(
            last.content,
            "[Image] look\n[Image description] A sunset over water."
        );
    }

    #[tokio::test]
    async fn test_append_image_turn_failure_leaves_transcript() {
        let mut vision = MockLlmProvider::new();
        vision
            .expect_describe_image()
            .returning(|_, _, _, _| Err(LlmError::ApiError("quota".to_string())));
        let llm = LlmClient::with_providers(None, "chat", Some(Arc::new(vision)), "vision");

        let mut t = Transcript::seeded("seed");
        let result = append_image_turn(&mut t, &llm, None, ImageInput::jpeg(vec![1])).await;
        assert!(result.is_err());
        assert_eq!(t.len(), 1);
    }
}
