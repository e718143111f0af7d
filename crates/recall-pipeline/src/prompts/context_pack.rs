use super::Lang;

/// Pure composition of the final memory string. No LLM involved.
pub fn render(lang: Lang, profile_section: &str, event_section: &str) -> String {
    match lang {
        Lang::En => format!(
            "<memory>\n\
             # Below is the user profile:\n\
             {profile_section}\n\n\
             # Below is the latest events of the user:\n\
             {event_section}\n\
             </memory>\n\
             Unless the user has relevant queries, do not actively mention those memories in the conversation.\n"
        ),
        Lang::Zh => format!(
            "<memory>\n\
             # 以下是用户的用户画像：\n\
             {profile_section}\n\n\
             # 以下是用户的最近事件：\n\
             {event_section}\n\
             </memory>\n\
             除非用户有相关的需求，否则不要主动在对话中提到这些记忆。\n"
        ),
    }
}
