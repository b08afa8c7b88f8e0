//! Page commands sent by host clients
//!
//! The hub does not own a UI control taxonomy. It hands the opaque command
//! string of a `pageCommandFromHost` message to a [`CommandProcessor`] and
//! broadcasts whatever controls the processor reports as changed.
//!
//! [`TextCommandProcessor`] is the built-in processor. Its grammar is
//! line-oriented and deliberately small:
//!
//! ```text
//! add <type> [to <parentID>] [key=value ...]    → result: new control ID
//! set <id> key=value [key=value ...]
//! get <id> <attr>                                → result: attribute value
//! remove <id>
//! ```
//!
//! Values may be double-quoted to contain spaces (`text="hello world"`).

use crate::core::control::{Control, ROOT_CONTROL_ID};
use crate::core::error::{HubError, HubResult};
use crate::core::page::Page;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// What executing a command produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Returned to the host in the response's `result` field
    pub result: String,
    /// Controls created or modified, to be pushed to web clients
    pub changes: Vec<Control>,
    /// IDs of removed controls
    pub removed: Vec<String>,
}

impl CommandOutcome {
    /// Whether web clients need to hear about this command
    pub fn is_mutation(&self) -> bool {
        !self.changes.is_empty() || !self.removed.is_empty()
    }
}

/// Applies command strings to a page's control table
#[async_trait]
pub trait CommandProcessor: Send + Sync {
    async fn execute(&self, page: &Page, command: &str) -> HubResult<CommandOutcome>;
}

/// The built-in command processor
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCommandProcessor;

impl TextCommandProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandProcessor for TextCommandProcessor {
    async fn execute(&self, page: &Page, command: &str) -> HubResult<CommandOutcome> {
        let tokens = tokenize(command)?;
        let Some((verb, args)) = tokens.split_first() else {
            return Err(HubError::rejected("empty command"));
        };

        match verb.to_ascii_lowercase().as_str() {
            "add" => add(page, args).await,
            "set" => set(page, args).await,
            "get" => get(page, args).await,
            "remove" => remove(page, args).await,
            other => Err(HubError::rejected(format!("unknown command '{}'", other))),
        }
    }
}

async fn add(page: &Page, args: &[String]) -> HubResult<CommandOutcome> {
    let Some((control_type, mut rest)) = args.split_first() else {
        return Err(HubError::rejected("add: control type expected"));
    };
    if control_type.contains('=') {
        return Err(HubError::rejected("add: control type expected"));
    }

    let mut parent_id = ROOT_CONTROL_ID.to_string();
    if rest.first().is_some_and(|t| t.eq_ignore_ascii_case("to")) {
        parent_id = rest
            .get(1)
            .cloned()
            .ok_or_else(|| HubError::rejected("add: parent id expected after 'to'"))?;
        rest = &rest[2..];
    }

    let attrs = parse_attrs(rest)?;
    let control = page.add_control(control_type, &parent_id, attrs).await?;

    let mut changes = vec![control.clone()];
    if let Some(parent) = page.control(&parent_id).await {
        changes.push(parent);
    }

    Ok(CommandOutcome {
        result: control.id,
        changes,
        removed: Vec::new(),
    })
}

async fn set(page: &Page, args: &[String]) -> HubResult<CommandOutcome> {
    let Some((control_id, rest)) = args.split_first() else {
        return Err(HubError::rejected("set: control id expected"));
    };
    if rest.is_empty() {
        return Err(HubError::rejected("set: at least one key=value expected"));
    }

    let attrs = parse_attrs(rest)?;
    let control = page.set_control_attrs(control_id, attrs).await?;

    Ok(CommandOutcome {
        result: String::new(),
        changes: vec![control],
        removed: Vec::new(),
    })
}

async fn get(page: &Page, args: &[String]) -> HubResult<CommandOutcome> {
    let [control_id, attr] = args else {
        return Err(HubError::rejected("get: expected <id> <attr>"));
    };

    let control = page
        .control(control_id)
        .await
        .ok_or_else(|| HubError::ControlNotFound {
            control_id: control_id.clone(),
        })?;

    Ok(CommandOutcome {
        result: control.attrs.get(attr).cloned().unwrap_or_default(),
        ..Default::default()
    })
}

async fn remove(page: &Page, args: &[String]) -> HubResult<CommandOutcome> {
    let [control_id] = args else {
        return Err(HubError::rejected("remove: expected <id>"));
    };

    let (removed, parent) = page.remove_control(control_id).await?;

    Ok(CommandOutcome {
        result: String::new(),
        changes: vec![parent],
        removed,
    })
}

fn parse_attrs(tokens: &[String]) -> HubResult<BTreeMap<String, String>> {
    tokens
        .iter()
        .map(|token| match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(HubError::rejected(format!(
                "expected key=value, got '{}'",
                token
            ))),
        })
        .collect()
}

/// Split on whitespace, honoring double quotes and backslash escapes in them
fn tokenize(command: &str) -> HubResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = command.trim().chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            '\\' if in_quotes => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| HubError::rejected("dangling escape"))?;
                current.push(escaped);
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(HubError::rejected("unterminated quote"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(page: &Page, command: &str) -> HubResult<CommandOutcome> {
        TextCommandProcessor::new().execute(page, command).await
    }

    #[test]
    fn test_tokenize_quotes() {
        let tokens = tokenize(r#"add text value="hello world" id=x"#).unwrap();
        assert_eq!(tokens, vec!["add", "text", "value=hello world", "id=x"]);
    }

    #[test]
    fn test_tokenize_escapes_and_empty_value() {
        let tokens = tokenize(r#"set 1 value="say \"hi\"" empty="""#).unwrap();
        assert_eq!(tokens, vec!["set", "1", r#"value=say "hi""#, "empty="]);
    }

    #[test]
    fn test_tokenize_unterminated_quote() {
        assert!(tokenize(r#"set 1 value="oops"#).is_err());
    }

    #[tokio::test]
    async fn test_add_to_root_by_default() {
        let page = Page::new("home", false);

        let outcome = run(&page, "add text value=hi").await.unwrap();

        assert_eq!(outcome.result, "1");
        assert!(outcome.is_mutation());
        assert_eq!(outcome.changes[0].attrs["value"], "hi");
        assert_eq!(outcome.changes[1].id, "0");
        assert_eq!(outcome.changes[1].child_ids, vec!["1"]);
    }

    #[tokio::test]
    async fn test_add_to_parent() {
        let page = Page::new("home", false);
        run(&page, "add stack").await.unwrap();

        let outcome = run(&page, "ADD button to 1 text=\"Click me\"").await.unwrap();

        assert_eq!(outcome.result, "2");
        assert_eq!(page.control("2").await.unwrap().parent_id, "1");
        assert_eq!(page.control("2").await.unwrap().attrs["text"], "Click me");
    }

    #[tokio::test]
    async fn test_add_to_unknown_parent_fails_cleanly() {
        let page = Page::new("home", false);

        let err = run(&page, "add text to 7").await.unwrap_err();

        assert_eq!(err.to_string(), "parent control with id '7' not found");
        assert_eq!(page.control_count().await, 1);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let page = Page::new("home", false);
        run(&page, "add text value=a").await.unwrap();

        let outcome = run(&page, "set 1 value=b").await.unwrap();
        assert_eq!(outcome.changes[0].attrs["value"], "b");

        let outcome = run(&page, "get 1 value").await.unwrap();
        assert_eq!(outcome.result, "b");
        assert!(!outcome.is_mutation());

        let outcome = run(&page, "get 1 missing").await.unwrap();
        assert_eq!(outcome.result, "");
    }

    #[tokio::test]
    async fn test_remove() {
        let page = Page::new("home", false);
        run(&page, "add stack").await.unwrap();
        run(&page, "add text to 1").await.unwrap();

        let outcome = run(&page, "remove 1").await.unwrap();

        assert_eq!(outcome.removed, vec!["1", "2"]);
        assert!(outcome.changes[0].child_ids.is_empty());
        assert_eq!(page.control_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let page = Page::new("home", false);

        for command in [
            "",
            "   ",
            "explode 1",
            "add",
            "add key=value",
            "add text to",
            "set 0",
            "set 0 novalue",
            "get 0",
            "remove",
        ] {
            let err = run(&page, command).await.unwrap_err();
            assert_eq!(err.error_code(), "COMMAND_REJECTED", "command: {:?}", command);
        }
    }
}
