//! 域名白名单/黑名单：决定请求能否走 any-host 通道。

use regex::Regex;
use reqwest::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Allowed,
    Blocked,
    Unknown,
}

pub trait DomainPolicy {
    fn domain_state(&self, domain: &str) -> DomainState;

    fn domain_from_url(&self, url: &str) -> Option<String> {
        domain_from_url(url)
    }

    /// 目标域名被明确允许时，请求可以绕过源主机限制。
    fn is_trusted_url(&self, url: &str) -> bool {
        self.domain_from_url(url)
            .map(|domain| self.domain_state(&domain) == DomainState::Allowed)
            .unwrap_or(false)
    }
}

pub fn domain_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
}

/// 基于配置的通配符规则（如 `*.example.com`），黑名单优先。
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: Vec<Regex>,
    blocked: Vec<Regex>,
}

impl AllowList {
    pub fn new(allowed: &[String], blocked: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            allowed: compile_patterns(allowed)?,
            blocked: compile_patterns(blocked)?,
        })
    }
}

impl DomainPolicy for AllowList {
    fn domain_state(&self, domain: &str) -> DomainState {
        let domain = domain.to_ascii_lowercase();
        if self.blocked.iter().any(|re| re.is_match(&domain)) {
            return DomainState::Blocked;
        }
        if self.allowed.iter().any(|re| re.is_match(&domain)) {
            return DomainState::Allowed;
        }
        DomainState::Unknown
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| Regex::new(&wildcard_to_regex(p)))
        .collect()
}

// `*` 匹配任意多个字符（含点），其余字符按字面量处理。
fn wildcard_to_regex(pattern: &str) -> String {
    let escaped: Vec<String> = pattern
        .to_ascii_lowercase()
        .split('*')
        .map(regex::escape)
        .collect();
    format!("^{}$", escaped.join(".*"))
}
