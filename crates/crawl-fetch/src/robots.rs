//! Per-host robots.txt decision cache. Fails open: a missing file, a 4xx/5xx
//! response, or a transport error all resolve to "allow everything".

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Clone, Default)]
struct RobotsPolicy {
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsPolicy {
    fn allow_all() -> Self {
        Self::default()
    }

    /// Longest matching prefix wins; an `Allow` prefix of equal length to a
    /// `Disallow` prefix takes precedence (the usual robots.txt tie-break).
    fn permits(&self, path: &str) -> bool {
        let mut best_len = -1i64;
        let mut best_allowed = true;
        for rule in &self.disallow {
            if path.starts_with(rule.as_str()) {
                let len = rule.len() as i64;
                if len > best_len {
                    best_len = len;
                    best_allowed = false;
                }
            }
        }
        for rule in &self.allow {
            if path.starts_with(rule.as_str()) {
                let len = rule.len() as i64;
                if len >= best_len {
                    best_len = len;
                    best_allowed = true;
                }
            }
        }
        best_allowed
    }
}

fn parse_robots_txt(body: &str, user_agent: &str) -> RobotsPolicy {
    let mut groups: Vec<(Vec<String>, RobotsPolicy)> = Vec::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut current_policy = RobotsPolicy::default();
    // True once a Disallow/Allow line has been seen for the agents currently
    // accumulating in `current_agents` — a further User-agent line after
    // that starts a new group rather than extending this one.
    let mut directive_seen = false;

    for raw_line in body.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        match key.as_str() {
            "user-agent" => {
                if directive_seen && !current_agents.is_empty() {
                    groups.push((
                        std::mem::take(&mut current_agents),
                        std::mem::take(&mut current_policy),
                    ));
                    directive_seen = false;
                }
                current_agents.push(value.to_ascii_lowercase());
            }
            "disallow" => {
                directive_seen = true;
                if !value.is_empty() {
                    current_policy.disallow.push(value);
                }
            }
            "allow" => {
                directive_seen = true;
                current_policy.allow.push(value);
            }
            _ => {}
        }
    }
    if !current_agents.is_empty() {
        groups.push((current_agents, current_policy));
    }

    let lower_ua = user_agent.to_ascii_lowercase();
    groups
        .iter()
        .find(|(agents, _)| agents.iter().any(|a| lower_ua.contains(a.as_str())))
        .or_else(|| groups.iter().find(|(agents, _)| agents.iter().any(|a| a == "*")))
        .map(|(_, policy)| policy.clone())
        .unwrap_or_else(RobotsPolicy::allow_all)
}

pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    cache: Mutex<HashMap<String, RobotsPolicy>>,
}

impl RobotsCache {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub async fn allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        if parsed.scheme() == "file" {
            return true;
        }
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let key = format!("{}://{}", parsed.scheme(), host);

        let mut cache = self.cache.lock().await;
        if let Some(policy) = cache.get(&key) {
            return policy.permits(parsed.path());
        }

        let robots_url = format!("{key}/robots.txt");
        let policy = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => parse_robots_txt(&body, &self.user_agent),
                Err(_) => RobotsPolicy::allow_all(),
            },
            _ => RobotsPolicy::allow_all(),
        };

        let allowed = policy.permits(parsed.path());
        cache.insert(key, policy);
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_allows_when_no_rules_match() {
        let policy = RobotsPolicy::allow_all();
        assert!(policy.permits("/anything"));
    }

    #[test]
    fn permits_respects_longest_prefix() {
        let policy = RobotsPolicy {
            disallow: vec!["/private".to_string()],
            allow: vec!["/private/public".to_string()],
        };
        assert!(!policy.permits("/private/secret"));
        assert!(policy.permits("/private/public/page"));
    }

    #[test]
    fn parse_picks_matching_user_agent_group_over_wildcard() {
        let body = "User-agent: *\nDisallow: /\n\nUser-agent: GoodBot\nDisallow:\n";
        let policy = parse_robots_txt(body, "GoodBot/1.0");
        assert!(policy.permits("/anything"));
    }

    #[test]
    fn parse_falls_back_to_wildcard_group() {
        let body = "User-agent: *\nDisallow: /admin\n";
        let policy = parse_robots_txt(body, "SomeOtherBot/1.0");
        assert!(!policy.permits("/admin/page"));
        assert!(policy.permits("/public"));
    }
}
