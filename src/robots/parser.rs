//! robots.txt rule evaluation
//!
//! Allow/Disallow matching is delegated to the `robotstxt` crate (a port of
//! Google's reference matcher). `Crawl-delay` is not part of that matcher, so
//! it is read here directly.

use robotstxt::DefaultMatcher;

/// Reduces a full user agent to its product token
///
/// `SumiLinkgraph/1.0 (+https://example.com/bot)` becomes `SumiLinkgraph`.
/// robots.txt groups are addressed by product token only.
pub fn product_token(user_agent: &str) -> &str {
    let token = user_agent
        .trim()
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or("");
    if token.is_empty() {
        "*"
    } else {
        token
    }
}

/// Checks `url` (absolute, or a path) against robots.txt `content`
pub fn is_allowed(content: &str, user_agent: &str, url: &str) -> bool {
    let mut matcher = DefaultMatcher::default();
    matcher.one_agent_allowed_by_robots(content, product_token(user_agent), url)
}

/// Reads the `Crawl-delay` (seconds) that applies to `user_agent`
///
/// Once any group names the agent, only those groups apply: the `*` group's
/// delay is not inherited even when the agent's own groups set none.
/// Consecutive `User-agent` lines share one group; the first rule line
/// closes the agent list.
pub fn crawl_delay(content: &str, user_agent: &str) -> Option<f64> {
    let agent = product_token(user_agent).to_lowercase();

    let mut group: Vec<String> = Vec::new();
    let mut in_rules = false;
    let mut for_wildcard = None;
    let mut for_agent = None;
    let mut agent_named = false;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if in_rules {
                    group.clear();
                    in_rules = false;
                }
                let ua = value.to_lowercase();
                agent_named |= agent != "*" && ua == agent;
                group.push(ua);
            }
            "crawl-delay" => {
                in_rules = true;
                let Ok(delay) = value.parse::<f64>() else {
                    continue;
                };
                if !delay.is_finite() || delay < 0.0 {
                    continue;
                }
                if agent != "*" && group.iter().any(|ua| ua == &agent) {
                    for_agent.get_or_insert(delay);
                } else if group.iter().any(|ua| ua == "*") {
                    for_wildcard.get_or_insert(delay);
                }
            }
            _ => in_rules = true,
        }
    }

    if agent_named {
        for_agent
    } else {
        for_wildcard
    }
}
