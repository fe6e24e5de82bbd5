//! After the Deadline wire protocol: where to send text and how to read the reply.
//!
//! Transport lives with the callers (blocking in the CLI, async in the
//! language server); this module only builds requests and parses responses.

use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::{Error, RawMatch, SuggestionList};

const DEFAULT_SERVICE: &str = "https://www.polishmywriting.com/proxy.php?url=/checkDocument";

/// Error types the service reports that are never surfaced.
pub const IGNORED_TYPES: &[&str] = &[
    "bias language",
    "cliches",
    "complex expression",
    "diacritical marks",
    "double negatives",
    "hidden verbs",
    "jargon language",
    "passive voice",
    "phrases to avoid",
    "redundant expression",
];

pub fn service_url(language: &str) -> String {
    match language {
        "fr" | "de" | "pt" | "es" => {
            format!("https://{language}.service.afterthedeadline.com/checkDocument")
        }
        _ => DEFAULT_SERVICE.to_string(),
    }
}

/// Per-host API key the service expects: hex SHA-1 of the host name.
pub fn request_key(host: &str) -> String {
    format!("{:x}", Sha1::digest(host.as_bytes()))
}

pub fn host_name() -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    if host.is_empty() {
        "mdspell".to_string()
    } else {
        host
    }
}

/// A ready-to-send form POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub url: String,
    pub form: Vec<(&'static str, String)>,
}

impl CheckRequest {
    pub fn new(language: &str, text: &str, key: &str) -> Self {
        Self {
            url: service_url(language),
            form: vec![("data", text.to_string()), ("key", key.to_string())],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Results {
    #[serde(rename = "error", default)]
    errors: Vec<ReportedError>,
}

#[derive(Debug, Deserialize)]
struct ReportedError {
    string: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    precontext: Option<String>,
    #[serde(default)]
    suggestions: Option<Options>,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct Options {
    #[serde(rename = "option", default)]
    options: Vec<String>,
}

/// Parse a `<results>` document into raw matches, in the order reported.
pub fn parse_response(xml: &str) -> Result<Vec<RawMatch>, Error> {
    let results: Results =
        quick_xml::de::from_str(xml).map_err(|e| Error::Checker(format!("bad response: {e}")))?;

    Ok(results
        .errors
        .into_iter()
        .filter(|err| {
            let kind = err.kind.trim().to_lowercase();
            !IGNORED_TYPES.contains(&kind.as_str())
        })
        .map(|err| RawMatch {
            matched_text: err.string,
            preceding_context: err
                .precontext
                .map(|ctx| ctx.trim().to_string())
                .filter(|ctx| !ctx.is_empty()),
            category: err.description,
            suggestions: err
                .suggestions
                .map(|s| SuggestionList::Many(s.options)),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<?xml version="1.0"?>
<results>
  <error>
    <string>teh</string>
    <description>Spelling</description>
    <precontext>at</precontext>
    <suggestions>
      <option>the</option>
      <option>ten</option>
    </suggestions>
    <type>spelling</type>
    <url>http://service.afterthedeadline.com/info.slp?text=teh</url>
  </error>
  <error>
    <string>the</string>
    <description>Repeated Word</description>
    <precontext>the</precontext>
    <suggestions>
      <option>Remove duplicate</option>
    </suggestions>
    <type>grammar</type>
  </error>
  <error>
    <string>in order to</string>
    <description>Complex Expression</description>
    <precontext></precontext>
    <type>complex expression</type>
  </error>
</results>"#;

    #[test]
    fn parses_errors_in_reported_order() {
        let matches = parse_response(RESPONSE).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].matched_text, "teh");
        assert_eq!(matches[0].context(), "at");
        assert_eq!(matches[0].category, "Spelling");
        assert_eq!(matches[0].suggestion_vec(), vec!["the", "ten"]);
        assert_eq!(matches[1].suggestion_vec(), vec!["Remove duplicate"]);
    }

    #[test]
    fn empty_results_yield_no_matches() {
        assert!(parse_response("<results></results>").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_checker_error() {
        assert!(matches!(
            parse_response("<results><error>"),
            Err(Error::Checker(_))
        ));
    }

    #[test]
    fn routes_languages_to_their_service() {
        assert_eq!(
            service_url("de"),
            "https://de.service.afterthedeadline.com/checkDocument"
        );
        assert_eq!(service_url("en"), DEFAULT_SERVICE);
        assert_eq!(service_url("xx"), DEFAULT_SERVICE);
    }

    #[test]
    fn request_carries_text_and_key() {
        let request = CheckRequest::new("fr", "bonjour", &request_key("box"));
        assert_eq!(request.form[0], ("data", "bonjour".to_string()));
        assert_eq!(request.form[1].1.len(), 40);
    }

    #[test]
    fn key_is_sha1_hex_of_the_host() {
        assert_eq!(request_key("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn host_name_comes_from_the_os() {
        let os_host = gethostname::gethostname().to_string_lossy().into_owned();
        let host = host_name();
        assert!(!host.is_empty());
        if !os_host.is_empty() {
            assert_eq!(host, os_host);
        }
    }
}
