//! Script loader state machine against the in-memory document: memoized
//! loads, reload after unload, eager resolution, adoption of ready scripts,
//! the missing-document path, and component lifecycle binding.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use composa_core::scope::Scope;
use composa_dom::HostElement;
use composa_dom::memory::{MemoryDocument, MemoryElement};
use composa_use::script_tag::DATA_LOADED;
use composa_use::{LoadOutcome, PendingLoad, ScriptLoadError, ScriptTagOptions, use_script_tag};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const SRC: &str = "https://cdn.example/sdk.js";

fn poll_now(pending: &mut PendingLoad) -> Poll<LoadOutcome> {
    Pin::new(pending).poll(&mut Context::from_waker(Waker::noop()))
}

fn manual(doc: &MemoryDocument) -> ScriptTagOptions {
    ScriptTagOptions::default()
        .with_manual(true)
        .with_document(Some(doc.as_document_ref()))
}

fn scripts(doc: &MemoryDocument) -> Vec<MemoryElement> {
    doc.head_children()
        .into_iter()
        .filter(|node| node.tag_name() == "SCRIPT")
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Settle {
    Load,
    Error,
    Abort,
}

proptest! {
    #[test]
    fn concurrent_loads_share_one_element_and_outcome(
        waits in prop::collection::vec(any::<bool>(), 1..12),
        settle in prop_oneof![Just(Settle::Load), Just(Settle::Error), Just(Settle::Abort)],
    ) {
        let doc = MemoryDocument::new();
        let tag = use_script_tag(SRC, |_| {}, manual(&doc));

        // Every call joins the first, so the first flag decides readiness.
        let mut pendings: Vec<PendingLoad> = waits.iter().map(|&wait| tag.load(wait)).collect();
        prop_assert_eq!(doc.elements_created(), 1);
        prop_assert!(pendings.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));

        let script = scripts(&doc).pop().unwrap();
        let kind = match settle {
            Settle::Load => "load",
            Settle::Error => "error",
            Settle::Abort => "abort",
        };
        script.fire(kind);

        let outcomes: Vec<LoadOutcome> = pendings
            .iter_mut()
            .map(|pending| match poll_now(pending) {
                Poll::Ready(outcome) => outcome,
                Poll::Pending => panic!("load left pending after {kind}"),
            })
            .collect();
        let expected = match (waits[0], settle) {
            (false, _) | (true, Settle::Load) => Ok(Some(script.to_element())),
            (true, Settle::Error) => Err(ScriptLoadError::Errored { src: SRC.into() }),
            (true, Settle::Abort) => Err(ScriptLoadError::Aborted { src: SRC.into() }),
        };
        prop_assert!(outcomes.iter().all(|outcome| *outcome == expected));
        prop_assert_eq!(scripts(&doc).len(), 1);
    }
}

#[test]
fn unload_then_load_creates_a_new_element() {
    let doc = MemoryDocument::new();
    let tag = use_script_tag(SRC, |_| {}, manual(&doc));

    let first = pollster::block_on(tag.load(false)).unwrap().unwrap();
    tag.unload();
    assert!(scripts(&doc).is_empty());
    assert!(!tag.is_loaded());
    assert!(!tag.is_pending());
    assert_eq!(tag.script_tag(), None);

    let second = pollster::block_on(tag.load(false)).unwrap().unwrap();
    assert_ne!(first, second);
    assert_eq!(doc.elements_created(), 2);
    assert_eq!(scripts(&doc).len(), 1);
}

#[test]
fn eager_load_resolves_before_readiness() {
    let doc = MemoryDocument::new();
    let tag = use_script_tag(SRC, |_| {}, manual(&doc));
    let element = pollster::block_on(tag.load(false)).unwrap().unwrap();

    assert!(element.is_connected());
    assert!(!element.has_attribute(DATA_LOADED));
    assert!(tag.is_loaded());
}

#[test]
fn ready_script_is_reused() {
    let doc = MemoryDocument::new();
    let existing = doc.fixture("script");
    existing.set_attribute("src", SRC);
    existing.set_attribute(DATA_LOADED, "true");
    doc.head().append_child(&existing);

    let tag = use_script_tag(SRC, |_| {}, manual(&doc));
    let resolved = pollster::block_on(tag.load(true)).unwrap();

    assert_eq!(resolved, Some(existing.to_element()));
    assert_eq!(doc.elements_created(), 0);
    assert_eq!(scripts(&doc).len(), 1);
    assert_eq!(existing.listener_count(), 0);
}

#[test]
fn second_loader_for_same_src_joins_the_element() {
    let doc = MemoryDocument::new();
    let a = use_script_tag(SRC, |_| {}, manual(&doc));
    let b = use_script_tag(SRC, |_| {}, manual(&doc));

    let mut first = a.load(true);
    let mut second = b.load(true);
    assert_eq!(doc.elements_created(), 1);

    let script = scripts(&doc).pop().unwrap();
    script.fire("load");
    assert_eq!(poll_now(&mut first), Poll::Ready(Ok(Some(script.to_element()))));
    assert_eq!(poll_now(&mut second), Poll::Ready(Ok(Some(script.to_element()))));
}

#[test]
fn no_document_is_a_quiet_success() {
    let tag = use_script_tag(
        SRC,
        |_| {},
        ScriptTagOptions::default().with_document(None),
    );
    assert_eq!(pollster::block_on(tag.load(true)), Ok(None));
    tag.unload();
    assert_eq!(tag.script_tag(), None);
}

#[test]
fn component_mount_loads_and_unmount_removes() {
    let doc = MemoryDocument::new();
    let options = ScriptTagOptions::default().with_document(Some(doc.as_document_ref()));
    let scope = Scope::component();
    let tag = scope.run(|| use_script_tag(SRC, |_| {}, options)).unwrap();
    assert!(scripts(&doc).is_empty());

    scope.mount();
    assert_eq!(scripts(&doc).len(), 1);
    assert!(tag.is_pending());

    scripts(&doc)[0].fire("load");
    assert!(tag.is_loaded());

    scope.dispose();
    assert!(scripts(&doc).is_empty());
    assert!(!tag.is_loaded());
}

#[test]
fn disposing_the_component_detaches_readiness_listeners() {
    let doc = MemoryDocument::new();
    let options = ScriptTagOptions::default().with_document(Some(doc.as_document_ref()));
    let scope = Scope::component();
    let tag = scope.run(|| use_script_tag("/x.js", |_| {}, options)).unwrap();

    scope.mount();
    let script = scripts(&doc).pop().unwrap();
    assert_eq!(script.listener_count(), 3);

    scope.dispose();
    assert!(!script.is_connected());
    assert_eq!(script.listener_count(), 0);
    assert!(!tag.is_pending());
}

#[test]
fn not_immediate_waits_for_explicit_load() {
    let doc = MemoryDocument::new();
    let options = ScriptTagOptions::default()
        .with_immediate(false)
        .with_document(Some(doc.as_document_ref()));
    let scope = Scope::component();
    let tag = scope.run(|| use_script_tag(SRC, |_| {}, options)).unwrap();
    scope.mount();
    assert!(scripts(&doc).is_empty());

    let _ = tag.load(false);
    assert_eq!(scripts(&doc).len(), 1);
    scope.dispose();
    assert!(scripts(&doc).is_empty());
}

#[test]
fn outside_a_component_loads_right_away() {
    let doc = MemoryDocument::new();
    let options = ScriptTagOptions::default().with_document(Some(doc.as_document_ref()));
    let tag = use_script_tag(SRC, |_| {}, options);
    assert_eq!(scripts(&doc).len(), 1);
    assert!(tag.is_pending());
}
