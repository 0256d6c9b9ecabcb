//! robots.txt groups and path rules.
//!
//! Supports `User-agent`, `Allow` and `Disallow` lines with `*` wildcards and a
//! trailing `$` anchor. The most specific (longest) matching rule decides; `Allow`
//! wins a tie. Other directives (`Sitemap`, `Crawl-delay`, ...) are ignored.

use regex::Regex;

#[derive(Debug, Clone)]
struct PathRule {
    allow: bool,
    specificity: usize,
    pattern: Regex,
}

/// Rules that apply to one crawler for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<PathRule>,
}

#[derive(Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<PathRule>,
}

impl RobotsRules {
    /// No restrictions; used whenever robots.txt is missing or unreadable.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse `text` and keep the rules for `product` (matched case-insensitively against
    /// `User-agent` lines), falling back to the `*` group.
    pub fn parse(text: &str, product: &str) -> Self {
        let product = product.to_ascii_lowercase();
        let mut groups: Vec<Group> = Vec::new();
        let mut in_agent_lines = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if !in_agent_lines {
                        groups.push(Group::default());
                        in_agent_lines = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                directive @ ("allow" | "disallow") => {
                    in_agent_lines = false;
                    let Some(group) = groups.last_mut() else {
                        continue;
                    };
                    // An empty value carries no restriction.
                    if let Some(rule) = path_rule(directive == "allow", value) {
                        group.rules.push(rule);
                    }
                }
                _ => in_agent_lines = false,
            }
        }

        let select = |wanted: &str| -> Vec<PathRule> {
            groups
                .iter()
                .filter(|group| group.agents.iter().any(|agent| agent == wanted))
                .flat_map(|group| group.rules.iter().cloned())
                .collect()
        };
        let rules = if groups.iter().any(|group| group.agents.contains(&product)) {
            select(&product)
        } else {
            select("*")
        };
        Self { rules }
    }

    /// Whether `path` (path plus optional `?query`) may be fetched.
    pub fn is_allowed(&self, path: &str) -> bool {
        if path == "/robots.txt" {
            return true;
        }
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(path))
            .max_by_key(|rule| (rule.specificity, rule.allow))
            .is_none_or(|rule| rule.allow)
    }
}

fn path_rule(allow: bool, value: &str) -> Option<PathRule> {
    if value.is_empty() {
        return None;
    }
    let (body, anchored) = match value.strip_suffix('$') {
        Some(body) => (body, true),
        None => (value, false),
    };
    let mut source = String::from("^");
    for (i, part) in body.split('*').enumerate() {
        if i > 0 {
            source.push_str(".*");
        }
        source.push_str(&regex::escape(part));
    }
    if anchored {
        source.push('$');
    }
    Some(PathRule {
        allow,
        specificity: value.len(),
        pattern: Regex::new(&source).ok()?,
    })
}

/// Product token of a user agent string: `page-watch/0.1` becomes `page-watch`.
pub fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or(user_agent)
}

#[cfg(test)]
mod tests {
    use super::{product_token, RobotsRules};

    const SAMPLE: &str = "\
# storefront
User-agent: *
Disallow: /checkout
Disallow: /search?   # query pages
Allow: /checkout/pricing
Disallow: /*.pdf$
Sitemap: https://shop.test/sitemap.xml

User-agent: archiver
User-agent: mirror-bot
Disallow: /
";

    #[test]
    fn longest_match_decides_and_allow_wins_ties() {
        let rules = RobotsRules::parse(SAMPLE, "page-watch");
        assert!(rules.is_allowed("/pricing"));
        assert!(!rules.is_allowed("/checkout/cart"));
        assert!(rules.is_allowed("/checkout/pricing"));
        assert!(!rules.is_allowed("/search?q=plans"));
        assert!(rules.is_allowed("/search"));

        let tie = RobotsRules::parse("User-agent: *\nDisallow: /a\nAllow: /a\n", "page-watch");
        assert!(tie.is_allowed("/a/b"));
    }

    #[test]
    fn wildcards_and_end_anchor() {
        let rules = RobotsRules::parse(SAMPLE, "page-watch");
        assert!(!rules.is_allowed("/docs/brochure.pdf"));
        assert!(rules.is_allowed("/docs/brochure.pdf?download=1"));
    }

    #[test]
    fn a_named_group_replaces_the_wildcard_group() {
        assert!(!RobotsRules::parse(SAMPLE, "mirror-bot").is_allowed("/pricing"));
        assert!(!RobotsRules::parse(SAMPLE, "Archiver").is_allowed("/pricing"));

        let named_but_open = "User-agent: *\nDisallow: /\n\nUser-agent: page-watch\nAllow: /pricing\n";
        let rules = RobotsRules::parse(named_but_open, "page-watch");
        assert!(rules.is_allowed("/pricing"));
        assert!(rules.is_allowed("/blog"));
    }

    #[test]
    fn empty_or_missing_rules_allow_everything() {
        assert!(RobotsRules::parse("User-agent: *\nDisallow:\n", "page-watch").is_allowed("/x"));
        assert!(RobotsRules::parse("", "page-watch").is_allowed("/x"));
        assert!(RobotsRules::parse("Disallow: /\n", "page-watch").is_allowed("/x"));
        assert!(RobotsRules::parse("User-agent: *\nDisallow: /\n", "page-watch")
            .is_allowed("/robots.txt"));
    }

    #[test]
    fn product_token_drops_the_version() {
        assert_eq!(product_token("page-watch/0.1.0"), "page-watch");
        assert_eq!(product_token("curl"), "curl");
    }
}
