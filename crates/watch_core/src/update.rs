use chrono::{DateTime, Utc};

use crate::draft::{clamp_draft, render_bullets, select_for_draft};
use crate::fingerprint::fingerprint;
use crate::types::{ErrorKind, FetchedPage, Snapshot, StoreError, DRAFT_MAX_CHARS};
use crate::{CycleState, Effect, FirstSightPolicy, Msg, Phase};

/// Pure update function: applies a message to a cycle and returns the IO to perform next.
///
/// Messages that do not belong to the current phase are ignored.
pub fn update(mut state: CycleState, msg: Msg) -> (CycleState, Vec<Effect>) {
    if state.is_finished() {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Start if state.phase == Phase::Idle => {
            state.enter(Phase::Fetching);
            vec![Effect::Fetch {
                locator: state.target.locator.clone(),
            }]
        }
        Msg::FetchCompleted { result, fetched_at } if state.phase == Phase::Fetching => {
            match result {
                Ok(page) => normalize_page(&mut state, page, fetched_at),
                Err(err) => {
                    state.fail(ErrorKind::Fetch, err.to_string());
                    Vec::new()
                }
            }
        }
        Msg::SnapshotLoaded(result) if state.phase == Phase::Comparing => match result {
            Ok(current) if state.commit_attempts == 0 => compare(&mut state, current),
            Ok(current) => recheck(&mut state, current),
            Err(err) => {
                state.fail(ErrorKind::Store, err.to_string());
                Vec::new()
            }
        },
        Msg::DraftCompleted(result) if state.phase == Phase::Drafting => {
            let text = match result {
                Ok(text) => clamp_draft(&text, DRAFT_MAX_CHARS),
                // Fall back to the plain bullet brief over the same selection.
                Err(_) => {
                    let selected = select_for_draft(&state.segments, state.settings.excerpt_cap);
                    render_bullets(&state.target, &selected, DRAFT_MAX_CHARS)
                }
            };
            state.draft = Some(text.clone());
            state.enter(Phase::Notifying);
            vec![Effect::Notify { text }]
        }
        Msg::NotifyCompleted(result) if state.phase == Phase::Notifying => {
            // The page did change: commit even when delivery failed.
            if let Err(err) = result {
                state.notify_error = Some(err);
            }
            commit(&mut state)
        }
        Msg::CommitCompleted(result) if state.phase == Phase::Committing => match result {
            Ok(snapshot) => {
                state.finish_changed(Some(snapshot.version));
                Vec::new()
            }
            Err(StoreError::Conflict(_)) if state.commit_attempts < 2 => {
                state.enter(Phase::Comparing);
                vec![Effect::ReadSnapshot {
                    target_id: state.target.id.clone(),
                }]
            }
            Err(StoreError::Conflict(conflict)) => {
                let mut message = format!("{conflict} (after {} attempts)", state.commit_attempts);
                if let Some(err) = state.notify_error.take() {
                    message.push_str(&format!("; delivery had already failed: {err}"));
                }
                state.fail(ErrorKind::Conflict, message);
                Vec::new()
            }
            Err(err) => {
                state.fail(ErrorKind::Store, err.to_string());
                Vec::new()
            }
        },
        Msg::Cancelled => {
            let message = format!("cancelled during {:?}", state.phase);
            state.fail(ErrorKind::Cancelled, message);
            Vec::new()
        }
        _ => Vec::new(),
    };

    (state, effects)
}

fn normalize_page(state: &mut CycleState, page: FetchedPage, fetched_at: DateTime<Utc>) -> Vec<Effect> {
    state.enter(Phase::Normalizing);
    let normalized = state.settings.normalizer.normalize(
        &page.body,
        page.content_type.as_deref(),
        state.target.extraction.as_deref(),
    );
    match normalized {
        Ok(text) => {
            state.fingerprint = Some(fingerprint(&text));
            state.normalized = Some(text);
            state.captured_at = Some(fetched_at);
            state.enter(Phase::Comparing);
            vec![Effect::ReadSnapshot {
                target_id: state.target.id.clone(),
            }]
        }
        Err(err) => {
            state.fail(ErrorKind::MalformedInput, err.to_string());
            Vec::new()
        }
    }
}

fn compare(state: &mut CycleState, current: Option<Snapshot>) -> Vec<Effect> {
    let (Some(normalized), Some(new_fp)) = (state.normalized.clone(), state.fingerprint) else {
        state.fail(ErrorKind::Internal, "compared before normalizing");
        return Vec::new();
    };

    state.expected_version = current.as_ref().map_or(0, |s| s.version);
    if let Some(prior) = &current {
        if prior.fingerprint == new_fp && !state.settings.force_change {
            state.finish_no_change(Some(prior.version));
            return Vec::new();
        }
    }

    state.enter(Phase::Diffing);
    let baseline = match &current {
        Some(prior) if !state.settings.force_change => Some(prior.normalized_text.as_str()),
        _ => None,
    };
    state.segments = state.diff.diff(baseline, &normalized);

    if state.segments.is_empty() {
        // Only the layout moved (or the page is blank): nothing to report or store.
        state.finish_no_change(current.as_ref().map(|s| s.version));
        return Vec::new();
    }

    let seed_only = current.is_none() && state.settings.first_sight == FirstSightPolicy::Seed;
    if seed_only {
        return commit(state);
    }

    let selected = select_for_draft(&state.segments, state.settings.excerpt_cap);
    if selected.is_empty() {
        return commit(state);
    }
    state.enter(Phase::Drafting);
    vec![Effect::Draft { segments: selected }]
}

/// Conflict retry: re-run the comparison against the re-read snapshot, then commit.
///
/// Drafting and notifying already happened and are not repeated.
fn recheck(state: &mut CycleState, current: Option<Snapshot>) -> Vec<Effect> {
    state.expected_version = current.as_ref().map_or(0, |s| s.version);
    match current {
        Some(snapshot) if Some(snapshot.fingerprint) == state.fingerprint => {
            state.finish_changed(Some(snapshot.version));
            Vec::new()
        }
        _ => commit(state),
    }
}

fn commit(state: &mut CycleState) -> Vec<Effect> {
    let (Some(normalized_text), Some(fingerprint), Some(captured_at)) = (
        state.normalized.clone(),
        state.fingerprint,
        state.captured_at,
    ) else {
        state.fail(ErrorKind::Internal, "commit without a normalized page");
        return Vec::new();
    };

    state.commit_attempts += 1;
    state.enter(Phase::Committing);
    vec![Effect::Commit {
        candidate: Snapshot {
            target_id: state.target.id.clone(),
            normalized_text,
            fingerprint,
            captured_at,
            version: state.expected_version + 1,
        },
        expected_prior_version: state.expected_version,
    }]
}
