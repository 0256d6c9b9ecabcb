use pretty_assertions::assert_eq;
use watch_core::{split_blocks, ChangeKind, DiffEngine, Significance, MAX_RELEVANCE};

#[test]
fn first_sight_is_one_maximal_added_segment() {
    let segments = DiffEngine::default().diff(None, "Plan: $10/mo");
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].kind, ChangeKind::Added);
    assert_eq!(segments[0].excerpt, "Plan: $10/mo");
    assert_eq!(segments[0].relevance_score, MAX_RELEVANCE);
}

#[test]
fn first_sight_of_empty_page_has_no_segments() {
    assert!(DiffEngine::default().diff(None, "").is_empty());
}

#[test]
fn identical_text_has_no_segments() {
    let text = "Pricing\nFree tier available\nPro plan $20/mo";
    assert!(DiffEngine::default().diff(Some(text), text).is_empty());
}

#[test]
fn pricing_change_ranks_above_generic_rewording() {
    let segments = DiffEngine::default().diff(
        Some("Free tier available"),
        "Free tier removed. Pro plan now $20/mo",
    );
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].kind, ChangeKind::Added);
    assert_eq!(segments[0].excerpt, "Pro plan now $20/mo");
    assert_eq!(segments[1].kind, ChangeKind::Modified);
    assert_eq!(segments[1].excerpt, "Free tier removed.");
    assert!(segments[0].relevance_score > segments[1].relevance_score);
    assert!(segments[0].keywords.contains(&"plan".to_string()));
    assert!(segments[0].keywords.contains(&"$".to_string()));
    assert_eq!(Significance::assess(&segments), Significance::High);
}

#[test]
fn unrelated_replacement_is_removed_plus_added() {
    let segments = DiffEngine::new(Vec::<String>::new()).diff(
        Some("Header\nOld promo banner\nFooter"),
        "Header\nCompletely different announcement\nFooter",
    );
    let mut kinds: Vec<_> = segments.iter().map(|s| s.kind).collect();
    kinds.sort_by_key(|k| format!("{k:?}"));
    assert_eq!(kinds, vec![ChangeKind::Added, ChangeKind::Removed]);
}

#[test]
fn every_changed_block_is_covered_and_unchanged_blocks_are_not() {
    let old = "Intro line\nShared one\nGone forever. Still here\nShared two\nTail";
    let new = "Intro line\nBrand new block\nShared one\nStill here\nShared two\nTail changed a bit";
    let segments = DiffEngine::default().diff(Some(old), new);

    let old_blocks = split_blocks(old);
    let new_blocks = split_blocks(new);
    let excerpts: Vec<&str> = segments.iter().map(|s| s.excerpt.as_str()).collect();

    for block in &new_blocks {
        if !old_blocks.contains(block) {
            assert!(excerpts.contains(block), "added block {block:?} missing");
        }
    }
    for block in &old_blocks {
        if !new_blocks.contains(block) {
            let covered = excerpts.contains(block)
                || segments.iter().any(|s| s.kind == ChangeKind::Modified);
            assert!(covered, "removed block {block:?} missing");
        }
    }
    for block in old_blocks.iter().filter(|b| new_blocks.contains(b)) {
        assert!(!excerpts.contains(block), "unchanged block {block:?} reported");
    }
    assert!(excerpts.contains(&"Gone forever."));
    assert!(excerpts.contains(&"Tail changed a bit"));
}

#[test]
fn equal_scores_keep_document_order() {
    let engine = DiffEngine::new(Vec::<String>::new());
    // Same length, and position collapses to the same bucket for a long document.
    let old: Vec<String> = (0..100).map(|i| format!("line {i:03}")).collect();
    let mut new = old.clone();
    new.push("zzz added one".to_string());
    new.push("yyy added two".to_string());
    let segments = engine.diff(Some(&old.join("\n")), &new.join("\n"));
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].relevance_score, segments[1].relevance_score);
    assert_eq!(segments[0].excerpt, "zzz added one");
    assert_eq!(segments[1].excerpt, "yyy added two");
}

#[test]
fn changes_near_the_top_score_higher() {
    let engine = DiffEngine::new(Vec::<String>::new());
    let old = "a1\na2\na3\na4\na5\na6\na7\na8\na9\na10";
    let new = "top insert\na1\na2\na3\na4\na5\na6\na7\na8\na9\na10\nend insert";
    let segments = engine.diff(Some(old), new);
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].excerpt, "top insert");
    assert!(segments[0].relevance_score > segments[1].relevance_score);
}

#[test]
fn target_keywords_extend_global_list() {
    let engine = DiffEngine::new(["price"]).with_extra_keywords(&["Salesforce"]);
    let segments = engine.diff(Some("Integrations"), "Integrations\nNow with salesforce sync");
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].keywords, vec!["salesforce".to_string()]);
    assert_eq!(engine.keywords(), &["price".to_string(), "salesforce".to_string()]);
}
