//! The HTML analyzer — an external collaborator per the interface it
//! presents to the core (`analyze(url, html) -> AnalysisData`-shaped
//! counts). Implemented here with a tolerant regex pass rather than a full
//! parser, since the core only needs the shape of the output to be stable.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{FormAnalysis, HeadingCounts, HtmlVersion, LinkAnalysis, LoginFormDetails};

pub trait HtmlAnalyzer: Send + Sync {
    fn analyze(&self, url: &str, html: &str) -> HtmlAnalysisResult;
}

/// Everything the analyzer can determine without a network round-trip.
/// `link_analysis.inaccessible_links` is always empty here — the worker
/// fills it in after consulting the link checker.
#[derive(Debug, Clone)]
pub struct HtmlAnalysisResult {
    pub html_version: HtmlVersion,
    pub title: String,
    pub heading_counts: HeadingCounts,
    pub link_analysis: LinkAnalysis,
    pub form_analysis: FormAnalysis,
    pub external_link_urls: Vec<String>,
}

static DOCTYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE\s+([^>]*)>").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h([1-6])\b").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)<a\s+[^>]*href\s*=\s*["']([^"']+)["']"#).unwrap());
static FORM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<form\b([^>]*)>(.*?)</form>"#).unwrap()
});
static FORM_METHOD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)method\s*=\s*["']([^"']+)["']"#).unwrap());
static FORM_ACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)action\s*=\s*["']([^"']*)["']"#).unwrap());
static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)<input\b([^>]*)>"#).unwrap());
static INPUT_TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)type\s*=\s*["']([^"']+)["']"#).unwrap());
static INPUT_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)name\s*=\s*["']([^"']+)["']"#).unwrap());

pub struct RegexHtmlAnalyzer;

impl RegexHtmlAnalyzer {
    fn detect_version(html: &str) -> HtmlVersion {
        let Some(caps) = DOCTYPE_RE.captures(html) else {
            return HtmlVersion::Unknown;
        };
        let doctype = caps[1].to_lowercase();
        if doctype.contains("xhtml 1.1") {
            HtmlVersion::Xhtml11
        } else if doctype.contains("xhtml") {
            HtmlVersion::Xhtml10
        } else if doctype.contains("html 4.01") || doctype.contains("4.01") {
            HtmlVersion::Html401
        } else if doctype.trim() == "html" {
            HtmlVersion::Html5
        } else {
            HtmlVersion::Unknown
        }
    }

    fn is_external(url: &str, link: &str) -> bool {
        if link.starts_with('/') || link.starts_with('#') || !link.contains("://") {
            return false;
        }
        let base_host = Self::host_of(url);
        let link_host = Self::host_of(link);
        match (base_host, link_host) {
            (Some(a), Some(b)) => a != b,
            _ => true,
        }
    }

    fn host_of(url: &str) -> Option<String> {
        let without_scheme = url.split("://").nth(1)?;
        Some(
            without_scheme
                .split('/')
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        )
    }
}

impl HtmlAnalyzer for RegexHtmlAnalyzer {
    fn analyze(&self, url: &str, html: &str) -> HtmlAnalysisResult {
        let html_version = Self::detect_version(html);

        let title = TITLE_RE
            .captures(html)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();

        let mut heading_counts = HeadingCounts::default();
        for caps in HEADING_RE.captures_iter(html) {
            match &caps[1] {
                "1" => heading_counts.h1 += 1,
                "2" => heading_counts.h2 += 1,
                "3" => heading_counts.h3 += 1,
                "4" => heading_counts.h4 += 1,
                "5" => heading_counts.h5 += 1,
                "6" => heading_counts.h6 += 1,
                _ => {}
            }
        }

        let mut internal = 0u32;
        let mut external = 0u32;
        let mut external_link_urls = Vec::new();
        for caps in LINK_RE.captures_iter(html) {
            let href = caps[1].to_string();
            if Self::is_external(url, &href) {
                external += 1;
                external_link_urls.push(href);
            } else {
                internal += 1;
            }
        }
        let link_analysis = LinkAnalysis {
            internal,
            external,
            total: internal + external,
            inaccessible_links: Vec::new(),
        };

        let mut total_forms = 0u32;
        let mut login_forms = Vec::new();
        for caps in FORM_RE.captures_iter(html) {
            total_forms += 1;
            let attrs = &caps[1];
            let body = &caps[2];

            let method = FORM_METHOD_RE
                .captures(attrs)
                .map(|c| c[1].to_uppercase())
                .unwrap_or_else(|| "GET".to_string());
            let action = FORM_ACTION_RE
                .captures(attrs)
                .map(|c| c[1].to_string())
                .unwrap_or_default();

            let mut fields = Vec::new();
            let mut has_password = false;
            for input_caps in INPUT_RE.captures_iter(body) {
                let input_attrs = &input_caps[1];
                if let Some(t) = INPUT_TYPE_RE.captures(input_attrs) {
                    if t[1].eq_ignore_ascii_case("password") {
                        has_password = true;
                    }
                }
                if let Some(n) = INPUT_NAME_RE.captures(input_attrs) {
                    fields.push(n[1].to_string());
                }
            }

            if has_password {
                login_forms.push(LoginFormDetails {
                    method,
                    action,
                    fields,
                });
            }
        }

        let form_analysis = FormAnalysis {
            total_forms,
            login_form_count: login_forms.len() as u32,
            login_forms,
        };

        HtmlAnalysisResult {
            html_version,
            title,
            heading_counts,
            link_analysis,
            form_analysis,
            external_link_urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_single_h1() {
        let analyzer = RegexHtmlAnalyzer;
        let result = analyzer.analyze(
            "https://example.com",
            "<html><body><h1>Hi</h1></body></html>",
        );
        assert_eq!(result.heading_counts.h1, 1);
        assert_eq!(result.html_version, HtmlVersion::Unknown);
    }

    #[test]
    fn detects_html5_doctype() {
        let analyzer = RegexHtmlAnalyzer;
        let result = analyzer.analyze(
            "https://example.com",
            "<!DOCTYPE html><html><head><title>Hi</title></head></html>",
        );
        assert_eq!(result.html_version, HtmlVersion::Html5);
        assert_eq!(result.title, "Hi");
    }

    #[test]
    fn classifies_internal_and_external_links() {
        let analyzer = RegexHtmlAnalyzer;
        let html = r#"<a href="/about">About</a><a href="https://other.test/x">Other</a>"#;
        let result = analyzer.analyze("https://example.com", html);
        assert_eq!(result.link_analysis.internal, 1);
        assert_eq!(result.link_analysis.external, 1);
        assert_eq!(result.external_link_urls, vec!["https://other.test/x".to_string()]);
    }

    #[test]
    fn detects_login_form_by_password_field() {
        let analyzer = RegexHtmlAnalyzer;
        let html = r#"<form method="post" action="/login"><input type="text" name="user"><input type="password" name="pass"></form>"#;
        let result = analyzer.analyze("https://example.com", html);
        assert_eq!(result.form_analysis.total_forms, 1);
        assert_eq!(result.form_analysis.login_form_count, 1);
        assert_eq!(result.form_analysis.login_forms[0].method, "POST");
        assert_eq!(result.form_analysis.login_forms[0].fields, vec!["user", "pass"]);
    }
}
