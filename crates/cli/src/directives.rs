//! Parsing of `/project @branch` directives.

/// Target named in a message; either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub project: Option<String>,
    pub branch: Option<String>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.branch.is_none()
    }
}

/// Read leading `/<project>` and `@<branch>` tokens from command text.
///
/// Parsing stops at the first token that is not a directive; repeated
/// directives keep the first value.
pub fn parse_directives(text: &str) -> Directives {
    let mut directives = Directives::default();

    for token in text.split_whitespace() {
        if let Some(project) = token.strip_prefix('/').filter(|p| !p.is_empty()) {
            directives.project.get_or_insert_with(|| project.to_string());
        } else if let Some(branch) = token.strip_prefix('@').filter(|b| !b.is_empty()) {
            directives.branch.get_or_insert_with(|| branch.to_string());
        } else {
            break;
        }
    }

    directives
}

/// Read the `ctx: <project> @ <branch>` footer the bot appends to its replies.
///
/// The last footer line wins; backticks around it are ignored.
pub fn parse_context_footer(reply_text: &str) -> Option<Directives> {
    let footer = reply_text
        .lines()
        .rev()
        .map(|line| line.trim().trim_matches('`').trim())
        .find_map(|line| line.strip_prefix("ctx:"))?;

    let (project, branch) = match footer.split_once('@') {
        Some((project, branch)) => (project.trim(), Some(branch.trim())),
        None => (footer.trim(), None),
    };
    if project.is_empty() {
        return None;
    }

    Some(Directives {
        project: Some(project.to_string()),
        branch: branch.filter(|b| !b.is_empty()).map(str::to_string),
    })
}
