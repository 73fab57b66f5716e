//! The Resolver: turns a consumer's declared `dependencies` / `llm_filter` /
//! `llm_provider` into concrete provider endpoints against the currently
//! healthy fleet. Grounded in the client runtime's own `DependencyResolver`
//! (`runtime/core/src/registry.rs`) mirrored server-side, and in the
//! gateway's `DependencyClients` candidate-selection loop.

use semver::{Version, VersionReq};

use crate::domain::{AgentStatus, ProviderCandidate, ResolutionStatus};
use crate::spec::{DependencyPosition, DependencySpec, ResolvedProvider};

/// A scored, still-unsorted match of one candidate against one spec.
struct ScoredCandidate<'a> {
    candidate: &'a ProviderCandidate,
    score: i32,
}

/// Does `version` satisfy `required`? Real semver syntax (ranges, tilde,
/// caret, comparison operators) is honored; anything `semver` can't parse
/// falls back to byte-for-byte string equality (§4.2).
fn version_matches(candidate_version: &str, required: &str) -> bool {
    match (
        VersionReq::parse(required),
        Version::parse(candidate_version),
    ) {
        (Ok(req), Ok(version)) => req.matches(&version),
        _ => candidate_version == required,
    }
}

/// Score one candidate against one spec's tag slots, honoring required
/// capability/version/namespace gates first. `None` means rejected.
fn score_candidate(spec: &DependencySpec, candidate: &ProviderCandidate) -> Option<i32> {
    if candidate.capability.capability != spec.capability {
        return None;
    }
    if candidate.agent.status != AgentStatus::Healthy {
        return None;
    }
    if let Some(ns) = &spec.namespace {
        if &candidate.agent.namespace != ns {
            return None;
        }
    }
    if let Some(version) = &spec.version {
        if !version_matches(&candidate.capability.version, version) {
            return None;
        }
    }
    let mut total = 0;
    for slot in &spec.tag_slots {
        match slot.evaluate(&candidate.capability.tags) {
            Some(score) => total += score,
            None => return None,
        }
    }
    Some(total)
}

/// Pick the best-scoring healthy candidate for one spec, if any. Ties break
/// on insertion order in the provider set — `sort_by` is stable, so leaving
/// the comparator to score alone already keeps equally-scored candidates in
/// the order they were passed in.
fn best_match<'a>(
    spec: &DependencySpec,
    candidates: &'a [ProviderCandidate],
) -> Option<&'a ProviderCandidate> {
    let mut scored: Vec<ScoredCandidate<'a>> = candidates
        .iter()
        .filter_map(|c| score_candidate(spec, c).map(|score| ScoredCandidate { candidate: c, score }))
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.into_iter().next().map(|s| s.candidate)
}

fn to_resolved(candidate: &ProviderCandidate) -> ResolvedProvider {
    ResolvedProvider {
        agent_id: candidate.agent.id.clone(),
        function_name: candidate.capability.function_name.clone(),
        capability: candidate.capability.capability.clone(),
        endpoint: candidate.agent.endpoint(),
        status: candidate.agent.status.as_str().to_string(),
    }
}

/// Outcome of resolving one `dependencies[]` position: the winning provider
/// (if any) plus the row persisted to `dependency_resolutions`.
pub struct PositionResolution {
    pub provider: Option<ResolvedProvider>,
    pub status: ResolutionStatus,
}

/// Resolve one position, trying each alternative in declared order and
/// taking the first that yields any match (§4.2 "first-matching-wins").
pub fn resolve_position(
    position: &DependencyPosition,
    candidates: &[ProviderCandidate],
) -> PositionResolution {
    for spec in position.alternatives() {
        if let Some(winner) = best_match(spec, candidates) {
            return PositionResolution {
                provider: Some(to_resolved(winner)),
                status: ResolutionStatus::Available,
            };
        }
    }
    PositionResolution {
        provider: None,
        status: ResolutionStatus::Unresolved,
    }
}

/// Resolve every `dependencies[]` position for one function, preserving
/// declared order (the index becomes `position` in the persisted row).
pub fn resolve_dependencies(
    positions: &[DependencyPosition],
    candidates_by_capability: impl Fn(&str) -> Vec<ProviderCandidate>,
) -> Vec<PositionResolution> {
    positions
        .iter()
        .map(|position| {
            let spec = position.alternatives();
            let capability = spec.first().map(|s| s.capability.as_str()).unwrap_or("");
            let candidates = candidates_by_capability(capability);
            resolve_position(position, &candidates)
        })
        .collect()
}

/// Resolve an `llm_filter`: union of every *other* agent's tools whose
/// capability+tags satisfy any one of the filter's entries (OR across
/// entries unless `filter_mode == "and"`, in which case a tool must satisfy
/// all entries). Unlike a dependency position this keeps every match, not
/// just the best one.
pub fn resolve_llm_filter(
    entries: &[DependencySpec],
    filter_mode_and: bool,
    other_tools: &[ProviderCandidate],
) -> Vec<ResolvedProvider> {
    if entries.is_empty() {
        return Vec::new();
    }
    other_tools
        .iter()
        .filter(|candidate| {
            if filter_mode_and {
                entries.iter().all(|spec| score_candidate(spec, candidate).is_some())
            } else {
                entries.iter().any(|spec| score_candidate(spec, candidate).is_some())
            }
        })
        .map(to_resolved)
        .collect()
}

/// Resolve an `llm_provider`: exactly one winner, same scoring as a
/// dependency position but expressed as a single spec rather than a
/// positional list.
pub fn resolve_llm_provider(
    spec: &DependencySpec,
    candidates: &[ProviderCandidate],
) -> Option<ResolvedProvider> {
    best_match(spec, candidates).map(to_resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentRecord, CapabilityRecord};
    use chrono::Utc;

    fn agent(id: &str, status: AgentStatus) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            name: id.to_string(),
            namespace: "default".to_string(),
            kind: "mcp_agent".to_string(),
            runtime: "python".to_string(),
            version: "1.0.0".to_string(),
            http_host: Some("10.0.0.1".to_string()),
            http_port: Some(8080),
            status,
            updated_at: Utc::now(),
            last_full_refresh: None,
            total_dependencies: 0,
            dependencies_resolved: 0,
        }
    }

    fn candidate(
        agent_id: &str,
        status: AgentStatus,
        capability: &str,
        version: &str,
        tags: &[&str],
    ) -> ProviderCandidate {
        ProviderCandidate {
            agent: agent(agent_id, status),
            capability: CapabilityRecord {
                agent_id: agent_id.to_string(),
                function_name: "do_thing".to_string(),
                capability: capability.to_string(),
                version: version.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                description: String::new(),
                input_schema: None,
                llm_filter: None,
                llm_provider: None,
                kwargs: None,
            },
        }
    }

    fn spec(capability: &str, version: Option<&str>, tags: &[&str]) -> DependencySpec {
        use crate::spec::{TagAtom, TagSlot};
        DependencySpec {
            capability: capability.to_string(),
            version: version.map(|v| v.to_string()),
            tag_slots: tags.iter().map(|t| TagSlot(vec![TagAtom::parse(t)])).collect(),
            namespace: None,
        }
    }

    #[test]
    fn unhealthy_candidates_are_never_selected() {
        let candidates = vec![candidate("a1", AgentStatus::Unhealthy, "math", "1.0.0", &[])];
        let s = spec("math", None, &[]);
        assert!(best_match(&s, &candidates).is_none());
    }

    #[test]
    fn version_range_filters_out_incompatible_providers() {
        let candidates = vec![
            candidate("a1", AgentStatus::Healthy, "math", "1.0.0", &[]),
            candidate("a2", AgentStatus::Healthy, "math", "2.0.0", &[]),
        ];
        let s = spec("math", Some("^2"), &[]);
        let winner = best_match(&s, &candidates).unwrap();
        assert_eq!(winner.agent.id, "a2");
    }

    #[test]
    fn unparseable_version_falls_back_to_exact_string_match() {
        let candidates = vec![candidate("a1", AgentStatus::Healthy, "math", "nightly-42", &[])];
        let s = spec("math", Some("nightly-42"), &[]);
        assert!(best_match(&s, &candidates).is_some());
        let s2 = spec("math", Some("nightly-43"), &[]);
        assert!(best_match(&s2, &candidates).is_none());
    }

    #[test]
    fn preferred_tag_breaks_ties_between_equally_valid_candidates() {
        let candidates = vec![
            candidate("a1", AgentStatus::Healthy, "llm", "1.0.0", &["fast"]),
            candidate("a2", AgentStatus::Healthy, "llm", "1.0.0", &["fast", "opus"]),
        ];
        let s = spec("llm", None, &["fast", "+opus"]);
        let winner = best_match(&s, &candidates).unwrap();
        assert_eq!(winner.agent.id, "a2");
    }

    #[test]
    fn excluded_tag_rejects_candidate_outright() {
        let candidates = vec![candidate("a1", AgentStatus::Healthy, "llm", "1.0.0", &["premium"])];
        let s = spec("llm", None, &["-premium"]);
        assert!(best_match(&s, &candidates).is_none());
    }

    #[test]
    fn ties_are_broken_by_insertion_order() {
        let candidates = vec![
            candidate("b-agent", AgentStatus::Healthy, "math", "1.0.0", &[]),
            candidate("a-agent", AgentStatus::Healthy, "math", "1.0.0", &[]),
        ];
        let s = spec("math", None, &[]);
        let winner = best_match(&s, &candidates).unwrap();
        assert_eq!(winner.agent.id, "b-agent", "first-seen candidate wins an equal score");
    }

    #[test]
    fn alternatives_try_in_order_until_one_matches() {
        let candidates = vec![candidate("a1", AgentStatus::Healthy, "backup-math", "1.0.0", &[])];
        let position = DependencyPosition::Alternatives(vec![
            spec("primary-math", None, &[]),
            spec("backup-math", None, &[]),
        ]);
        let result = resolve_position(&position, &candidates);
        assert_eq!(result.status, ResolutionStatus::Available);
        assert_eq!(result.provider.unwrap().agent_id, "a1");
    }

    #[test]
    fn position_with_no_match_is_unresolved_not_an_error() {
        let position = DependencyPosition::Single(spec("missing", None, &[]));
        let result = resolve_position(&position, &[]);
        assert_eq!(result.status, ResolutionStatus::Unresolved);
        assert!(result.provider.is_none());
    }

    #[test]
    fn llm_filter_or_mode_unions_across_entries() {
        let tools = vec![
            candidate("a1", AgentStatus::Healthy, "chat", "1.0.0", &["gpt"]),
            candidate("a2", AgentStatus::Healthy, "chat", "1.0.0", &["claude"]),
            candidate("a3", AgentStatus::Healthy, "vision", "1.0.0", &[]),
        ];
        let entries = vec![spec("chat", None, &["gpt"]), spec("chat", None, &["claude"])];
        let matches = resolve_llm_filter(&entries, false, &tools);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn llm_filter_and_mode_requires_every_entry() {
        let tools = vec![candidate("a1", AgentStatus::Healthy, "chat", "1.0.0", &["gpt", "fast"])];
        let entries = vec![spec("chat", None, &["gpt"]), spec("chat", None, &["fast"])];
        let matches = resolve_llm_filter(&entries, true, &tools);
        assert_eq!(matches.len(), 1);
    }
}
