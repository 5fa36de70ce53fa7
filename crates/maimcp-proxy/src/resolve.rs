//! Name resolution: map an incoming identifier to exactly one upstream.
//!
//! Identifiers may carry a `server::` prefix. Bare identifiers resolve only
//! when exactly one upstream provides them, unless permissive matching is
//! on (drunk mode), in which case requested and candidate names are
//! normalized (lowercased, underscores stripped) and scored: normalized
//! equality beats containment beats a shared prefix or suffix, with the
//! shorter excess winning inside each band.

use std::sync::Arc;

use crate::error::ResolveError;
use crate::registry::{Registry, SEPARATOR};
use crate::upstream::Upstream;

/// Capability kind being resolved; selects which slice of each upstream is
/// searched and labels error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Executable operation
    Tool,
    /// Message template
    Prompt,
    /// Readable blob, addressed by URI
    Resource,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Prompt => "prompt",
            Self::Resource => "resource",
        }
    }
}

/// A successful resolution: the upstream and the bare capability name on it.
#[derive(Clone)]
pub struct Resolved {
    /// The chosen upstream
    pub upstream: Arc<Upstream>,
    /// Bare name (or URI) as the upstream knows it
    pub name: String,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved").field("name", &self.name).finish()
    }
}

fn names_of(upstream: &Upstream, kind: Kind) -> Vec<String> {
    match kind {
        Kind::Tool => upstream.tools.read().iter().map(|t| t.name.clone()).collect(),
        Kind::Prompt => upstream
            .prompts
            .read()
            .iter()
            .map(|p| p.name.clone())
            .collect(),
        Kind::Resource => upstream
            .resources
            .read()
            .iter()
            .map(|r| r.uri.clone())
            .collect(),
    }
}

/// Resolve `ident` against the registry.
pub fn resolve(
    registry: &Registry,
    kind: Kind,
    ident: &str,
    permissive: bool,
) -> Result<Resolved, ResolveError> {
    if let Some((server, rest)) = ident.split_once(SEPARATOR) {
        let upstream = registry.get(server).ok_or_else(|| ResolveError::UnknownServer {
            server: server.to_owned(),
        })?;
        let names = names_of(&upstream, kind);
        if names.iter().any(|n| n == rest) {
            return Ok(Resolved {
                upstream,
                name: rest.to_owned(),
            });
        }
        if permissive {
            return match best_match(rest, &names) {
                Match::One(name) => Ok(Resolved { upstream, name }),
                Match::Many => Err(ResolveError::Ambiguous {
                    kind: kind.label(),
                    name: ident.to_owned(),
                }),
                Match::None => Err(ResolveError::NotFound {
                    kind: kind.label(),
                    name: ident.to_owned(),
                }),
            };
        }
        return Err(ResolveError::NotFound {
            kind: kind.label(),
            name: ident.to_owned(),
        });
    }

    // Bare identifier: scan every upstream for an exact match first.
    let all = registry.all();
    let exact: Vec<&Arc<Upstream>> = all
        .iter()
        .filter(|u| names_of(u, kind).iter().any(|n| n == ident))
        .collect();
    match exact.len() {
        1 => {
            return Ok(Resolved {
                upstream: Arc::clone(exact[0]),
                name: ident.to_owned(),
            });
        }
        0 => {}
        _ => {
            return Err(ResolveError::Ambiguous {
                kind: kind.label(),
                name: ident.to_owned(),
            });
        }
    }

    if permissive {
        let mut best: Option<(u64, Arc<Upstream>, String)> = None;
        let mut tied = false;
        for upstream in &all {
            for name in names_of(upstream, kind) {
                let Some(score) = match_score(ident, &name) else {
                    continue;
                };
                match &best {
                    // Same name on two upstreams, or two equally close
                    // candidates: ambiguous either way.
                    Some((current, _, _)) if *current == score => tied = true,
                    Some((current, _, _)) if *current < score => {}
                    _ => {
                        best = Some((score, Arc::clone(upstream), name));
                        tied = false;
                    }
                }
            }
        }
        return match (best, tied) {
            (Some((_, upstream, name)), false) => Ok(Resolved { upstream, name }),
            (Some(_), true) => Err(ResolveError::Ambiguous {
                kind: kind.label(),
                name: ident.to_owned(),
            }),
            (None, _) => Err(ResolveError::NotFound {
                kind: kind.label(),
                name: ident.to_owned(),
            }),
        };
    }

    Err(ResolveError::NotFound {
        kind: kind.label(),
        name: ident.to_owned(),
    })
}

enum Match {
    One(String),
    Many,
    None,
}

/// Best permissive match among `names`, within a single upstream.
fn best_match(requested: &str, names: &[String]) -> Match {
    let mut best: Option<(u64, &str)> = None;
    let mut tied = false;
    for name in names {
        let Some(score) = match_score(requested, name) else {
            continue;
        };
        match best {
            Some((current, _)) if current == score => tied = true,
            Some((current, _)) if current < score => {}
            _ => {
                best = Some((score, name));
                tied = false;
            }
        }
    }
    match (best, tied) {
        (Some((_, name)), false) => Match::One(name.to_owned()),
        (Some(_), true) => Match::Many,
        (None, _) => Match::None,
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Score a candidate against the requested name; lower is better, `None`
/// means no permissive relation at all.
fn match_score(requested: &str, candidate: &str) -> Option<u64> {
    const CONTAINS: u64 = 1 << 20;
    const AFFIX: u64 = 2 << 20;

    let req = normalize(requested);
    let cand = normalize(candidate);
    if req == cand {
        return Some(0);
    }
    if req.contains(&cand) || cand.contains(&req) {
        let excess = req.len().abs_diff(cand.len()) as u64;
        return Some(CONTAINS + excess);
    }
    let prefix = req
        .bytes()
        .zip(cand.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = req
        .bytes()
        .rev()
        .zip(cand.bytes().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let shared = prefix.max(suffix);
    if shared > 0 {
        let excess = (req.len() + cand.len() - 2 * shared) as u64;
        return Some(AFFIX + excess);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::upstream_with_tools;
    use pretty_assertions::assert_eq;

    fn two_server_registry() -> Registry {
        let registry = Registry::new(false);
        registry.insert(upstream_with_tools("a", &["ping", "openFile"]));
        registry.insert(upstream_with_tools("b", &["ping"]));
        registry
    }

    #[test]
    fn qualified_exact_match() {
        let registry = two_server_registry();
        let resolved = resolve(&registry, Kind::Tool, "b::ping", false).unwrap();
        assert_eq!(resolved.upstream.name(), "b");
        assert_eq!(resolved.name, "ping");
    }

    #[test]
    fn qualified_unknown_server() {
        let registry = two_server_registry();
        let err = resolve(&registry, Kind::Tool, "c::ping", false).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownServer {
                server: "c".into()
            }
        );
    }

    #[test]
    fn bare_unique_match() {
        let registry = two_server_registry();
        let resolved = resolve(&registry, Kind::Tool, "openFile", false).unwrap();
        assert_eq!(resolved.upstream.name(), "a");
    }

    #[test]
    fn bare_ambiguous_match() {
        let registry = two_server_registry();
        let err = resolve(&registry, Kind::Tool, "ping", false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tool 'ping' is available on multiple servers; prefix with server name"
        );
    }

    #[test]
    fn bare_not_found() {
        let registry = two_server_registry();
        let err = resolve(&registry, Kind::Tool, "nope", false).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn permissive_underscore_rename() {
        let registry = two_server_registry();
        // No exact match for open_file; permissive matching finds openFile.
        assert!(resolve(&registry, Kind::Tool, "open_file", false).is_err());
        let resolved = resolve(&registry, Kind::Tool, "open_file", true).unwrap();
        assert_eq!(resolved.name, "openFile");
    }

    #[test]
    fn permissive_prefers_equality_over_containment() {
        let registry = Registry::new(false);
        registry.insert(upstream_with_tools("u", &["read", "read_file"]));
        let resolved = resolve(&registry, Kind::Tool, "READ", true).unwrap();
        assert_eq!(resolved.name, "read");
    }

    #[test]
    fn permissive_containment_shorter_excess_wins() {
        let registry = Registry::new(false);
        registry.insert(upstream_with_tools("u", &["list_files_recursive", "list_files"]));
        let resolved = resolve(&registry, Kind::Tool, "listfile", true).unwrap();
        assert_eq!(resolved.name, "list_files");
    }

    #[test]
    fn permissive_tie_is_ambiguous() {
        let registry = two_server_registry();
        let err = resolve(&registry, Kind::Tool, "pin_g", true).unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { .. }));
    }

    #[test]
    fn qualified_permissive_match_within_server() {
        let registry = two_server_registry();
        let resolved = resolve(&registry, Kind::Tool, "a::open_file", true).unwrap();
        assert_eq!(resolved.upstream.name(), "a");
        assert_eq!(resolved.name, "openFile");
    }

    #[test]
    fn affix_scoring() {
        // "grepx" vs "grep_text": no containment, shared prefix "grep".
        assert!(match_score("grepx", "grep_text").unwrap() >= (2 << 20));
        assert_eq!(match_score("zzz", "grep"), None);
    }
}
