const DUNGEON_MASTER_ROLE: &str = "You are a text adventure game's Dungeon Master.";

const CHOICE_FORMAT_RULE: &str = "formatted exactly as 'A) [Choice text]' and 'B) [Choice text]' on separate lines.";

pub fn opening_scene_prompt(idea: &str) -> String {
    format!(
        "{DUNGEON_MASTER_ROLE} The user's character and setting is: '{idea}'. \
Describe the opening scene vividly. \
Your response MUST end with two clear choices for the user, {CHOICE_FORMAT_RULE}"
    )
}

pub fn continuation_prompt(story_so_far: &str) -> String {
    format!(
        "{DUNGEON_MASTER_ROLE} Continue the story based on the user's last choice. \
Describe the outcome and the new scene. Keep the story consistent. \
Your response MUST end with two new, clear choices, {CHOICE_FORMAT_RULE} \
Here is the story so far:\n{story_so_far}"
    )
}

pub fn visual_prompt_instruction(scene: &str) -> String {
    format!(
        "You are an AI assistant that creates safe, simple, and concise image generation prompts. \
Based on the following fantasy story scene, create a very short, clean, descriptive prompt. \
It must be under 20 words. \
Style: beautiful digital art, fantasy, cinematic lighting. \
Scene: '{scene}'"
    )
}

/// Flattens newlines and drops markdown emphasis. Length is not enforced.
pub fn clean_visual_prompt(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ").replace('*', "").trim().to_string()
}
