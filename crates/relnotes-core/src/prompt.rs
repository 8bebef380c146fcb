//! Prompt templates for external notes generators.
//!
//! Templates are looked up by [`Locale`] and [`PromptKind`] and filled with
//! [`render_template`], which replaces `{name}` placeholders with the
//! top-level fields of any serializable context.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::release::Release;
use crate::version::conventional::ReleaseItem;

/// Language the generated notes should be written in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Simplified Chinese.
    Zh,
}

impl Locale {
    /// Language code, as used in configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

/// The kinds of prompt text a generator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Instructions describing the role and the JSON output contract.
    ReleaseNotesSystem,
    /// The per-release request carrying the classified changes.
    ReleaseNotesUser,
}

const EN_SYSTEM: &str = "\
You are a release manager writing release notes for {project}.
Reply with a single JSON object and nothing else. Schema:
{\"title\": string, \"summary\": string, \"highlights\": [string],
 \"sections\": [{\"title\": string, \"items\": [string]}],
 \"breaking_changes\": [string], \"links\": {string: string},
 \"recommended\": \"major\" | \"minor\" | \"patch\"}
Group changes into a few semantic sections with short emoji-prefixed titles.
Write for users, not for committers. Never invent changes.";

const EN_USER: &str = "\
Write release notes for {version} (previous: {previous_version}, bump: {version_bump}).

Breaking changes:
{breaking}

Features:
{features}

Bug fixes:
{bug_fixes}

Improvements:
{improvements}

Documentation:
{documentation}

Other:
{other}

Closed issues: {closed_issues}
Merged pull requests: {merged_prs}";

const ZH_SYSTEM: &str = "\
你是 {project} 的发布经理，负责撰写版本发布说明。
只返回一个 JSON 对象，不要输出其他内容。结构：
{\"title\": string, \"summary\": string, \"highlights\": [string],
 \"sections\": [{\"title\": string, \"items\": [string]}],
 \"breaking_changes\": [string], \"links\": {string: string},
 \"recommended\": \"major\" | \"minor\" | \"patch\"}
将变更归入少量语义分组，分组标题简短并以 emoji 开头。
面向用户撰写，不要编造变更。";

const ZH_USER: &str = "\
请为 {version} 撰写发布说明（上一版本：{previous_version}，升级类型：{version_bump}）。

破坏性变更：
{breaking}

新功能：
{features}

问题修复：
{bug_fixes}

改进：
{improvements}

文档：
{documentation}

其他：
{other}

关闭的 issue：{closed_issues}
合并的 PR：{merged_prs}";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

/// Look up the template text for a locale and prompt kind.
pub const fn get_prompt_template(locale: Locale, kind: PromptKind) -> &'static str {
    match (locale, kind) {
        (Locale::En, PromptKind::ReleaseNotesSystem) => EN_SYSTEM,
        (Locale::En, PromptKind::ReleaseNotesUser) => EN_USER,
        (Locale::Zh, PromptKind::ReleaseNotesSystem) => ZH_SYSTEM,
        (Locale::Zh, PromptKind::ReleaseNotesUser) => ZH_USER,
    }
}

/// Replace `{name}` placeholders with the top-level fields of `context`.
///
/// Strings are inserted verbatim, other scalars via their JSON form, arrays
/// of strings joined with `, `. Unknown placeholders (and literal braces in
/// the template, such as a JSON schema) are left untouched.
pub fn render_template<C: Serialize>(
    template: &str,
    context: &C,
) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(context)?;
    let Some(fields) = value.as_object() else {
        return Ok(template.to_string());
    };

    // Single pass, so substituted text is never itself re-expanded.
    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        fields
            .get(&caps[1])
            .map_or_else(|| caps[0].to_string(), placeholder_text)
    });
    Ok(rendered.into_owned())
}

fn placeholder_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(placeholder_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Flattened view of a [`Release`] used to fill the release notes prompts.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// Project name, e.g. `owner/repo`.
    pub project: String,
    /// New version tag.
    pub version: String,
    /// Previous version tag.
    pub previous_version: String,
    /// Bump label.
    pub version_bump: String,
    /// Bulleted breaking changes.
    pub breaking: String,
    /// Bulleted features.
    pub features: String,
    /// Bulleted bug fixes.
    pub bug_fixes: String,
    /// Bulleted improvements.
    pub improvements: String,
    /// Bulleted documentation changes.
    pub documentation: String,
    /// Bulleted other changes.
    pub other: String,
    /// Closed issue numbers.
    pub closed_issues: Vec<String>,
    /// Merged PR numbers.
    pub merged_prs: Vec<String>,
}

impl PromptContext {
    /// Build the prompt context for a release.
    pub fn from_release(project: &str, release: &Release) -> Self {
        Self {
            project: project.to_string(),
            version: release.version.clone(),
            previous_version: release.previous_version.clone(),
            version_bump: release.version_bump.to_string(),
            breaking: bullets(&release.breaking),
            features: bullets(&release.features),
            bug_fixes: bullets(&release.bug_fixes),
            improvements: bullets(&release.improvements),
            documentation: bullets(&release.documentation),
            other: bullets(&release.other),
            closed_issues: release.closed_issues.iter().map(|n| format!("#{n}")).collect(),
            merged_prs: release.merged_prs.iter().map(|n| format!("#{n}")).collect(),
        }
    }
}

fn bullets(items: &[ReleaseItem]) -> String {
    if items.is_empty() {
        return "- (none)".into();
    }
    items
        .iter()
        .map(|item| match item.scope {
            Some(ref scope) => format!("- {}({scope}): {}", item.commit_type, item.description),
            None => format!("- {}: {}", item.commit_type, item.description),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Commit;

    #[derive(Serialize)]
    struct Ctx {
        version: String,
        count: u32,
        names: Vec<String>,
        missing: Option<String>,
    }

    #[test]
    fn fills_named_placeholders() {
        let ctx = Ctx {
            version: "v1.2.0".into(),
            count: 3,
            names: vec!["a".into(), "b".into()],
            missing: None,
        };
        let out =
            render_template("{version}: {count} by {names}{missing} {unknown}", &ctx).unwrap();
        assert_eq!(out, "v1.2.0: 3 by a, b {unknown}");
    }

    #[test]
    fn schema_braces_survive_rendering() {
        let release = Release::from_commits(Some("v1.0.0"), vec![Commit::from_message("feat: x")]);
        let ctx = PromptContext::from_release("acme/widgets", &release);
        let system =
            render_template(get_prompt_template(Locale::En, PromptKind::ReleaseNotesSystem), &ctx)
                .unwrap();
        assert!(system.contains("acme/widgets"));
        assert!(system.contains("{\"title\": string"));
    }

    #[test]
    fn user_prompt_lists_changes() {
        let release = Release::from_commits(
            Some("v1.0.0"),
            vec![
                Commit::from_message("feat(cli): add flag (#9)"),
                Commit::from_message("fix: crash"),
            ],
        );
        let ctx = PromptContext::from_release("acme/widgets", &release);
        for locale in [Locale::En, Locale::Zh] {
            let user =
                render_template(get_prompt_template(locale, PromptKind::ReleaseNotesUser), &ctx)
                    .unwrap();
            assert!(user.contains("v1.1.0"));
            assert!(user.contains("- feat(cli): add flag"));
            assert!(user.contains("- fix: crash"));
            assert!(user.contains("#9"));
            assert!(!user.contains("{features}"));
        }
    }
}
