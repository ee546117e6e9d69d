mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::{init_logger, wait_for, MockTransport};
use streamer_session::{
    cache::ResourceCache,
    discovery::Discovery,
    protocol::{Method, ResourceList},
    transport::Transport,
};

fn transport() -> Arc<MockTransport> {
    init_logger();
    MockTransport::new("ws://streamer.local/".parse().unwrap())
}

fn discovery(transport: &Arc<MockTransport>) -> (Discovery, Arc<ResourceCache>) {
    let cache = Arc::new(ResourceCache::new());
    let transport: Arc<dyn Transport> = Arc::clone(transport) as _;
    let discovery = Discovery::new(transport, Arc::clone(&cache), CancellationToken::new());
    (discovery, cache)
}

#[tokio::test]
async fn walks_root_then_listed_resources() {
    let transport = transport();
    transport.with_two_resources();
    let (discovery, cache) = discovery(&transport);

    discovery.run().await;

    assert_eq!(
        transport.calls(),
        ["OPTIONS *", "LIST *", "OPTIONS a", "OPTIONS b"]
    );

    let snapshot = cache.snapshot();
    assert!(snapshot.root_capabilities().contains(&Method::List));
    assert_eq!(snapshot.root_list().len(), 2);
    assert_eq!(snapshot.resources().count(), 2);
    assert!(snapshot.revision().get() >= 3);

    let a = snapshot.resource("a").unwrap();
    assert!(a.capabilities.contains(&Method::Play));
    assert!(!a.fetching);
    assert!(a.children.is_empty());

    let uris: Vec<&str> = snapshot.resources().map(|(uri, _)| uri).collect();
    assert_eq!(uris, ["a", "b"]);
}

#[tokio::test]
async fn root_without_list_is_not_listed() {
    let transport = transport();
    transport.with_options("*", "OPTIONS, DESCRIBE");
    let (discovery, cache) = discovery(&transport);

    discovery.run().await;

    assert_eq!(transport.count("LIST *"), 0);
    let snapshot = cache.snapshot();
    assert!(snapshot.root_capabilities().contains(&Method::Describe));
    assert!(snapshot.root_list().is_empty());
    assert_eq!(snapshot.resources().count(), 0);
}

#[tokio::test]
async fn failure_keeps_partial_results() {
    let transport = transport();
    transport
        .with_options("*", "OPTIONS, LIST")
        .with_list("*", "a: A\nb: B\nc: C")
        .with_options("a", "OPTIONS");
    let (discovery, cache) = discovery(&transport);

    discovery.run().await;

    // `b` has no scripted answer; the run stops there.
    assert_eq!(transport.count("OPTIONS c"), 0);
    let snapshot = cache.snapshot();
    assert_eq!(snapshot.root_list().len(), 3);
    assert!(snapshot.resource("a").is_some());
    assert!(snapshot.resource("b").is_none());
}

#[tokio::test]
async fn cancelled_run_drops_late_results() {
    let transport = transport();
    transport.with_two_resources();
    transport.hold("OPTIONS b");
    let (discovery, cache) = discovery(&transport);

    let run = tokio::spawn({
        let discovery = discovery.clone();
        async move { discovery.run().await }
    });
    transport.wait_for_call("OPTIONS b").await;

    discovery.cancel();
    let revision = cache.revision();
    transport.release("OPTIONS b");
    run.await.unwrap();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.revision(), revision);
    assert!(snapshot.resource("a").is_some());
    assert!(snapshot.resource("b").is_none());
}

#[tokio::test]
async fn cancelled_run_issues_no_requests() {
    let transport = transport();
    transport.with_two_resources();
    let (discovery, cache) = discovery(&transport);

    discovery.cancel();
    discovery.run().await;

    assert!(transport.calls().is_empty());
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn fetching_unknown_resource_changes_nothing() {
    let transport = transport();
    transport.with_two_resources();
    let (discovery, cache) = discovery(&transport);
    discovery.run().await;
    let revision = cache.revision();

    discovery.fetch_children("nope").await;

    assert_eq!(cache.revision(), revision);
    assert_eq!(transport.count("LIST nope"), 0);
}

#[tokio::test]
async fn fetching_children_raises_and_lowers_flag() {
    let transport = transport();
    transport.with_two_resources().with_list("a", "a/1: One\na/2: Two");
    let (discovery, cache) = discovery(&transport);
    discovery.run().await;
    let revision = cache.revision();

    let mut changes = cache.subscribe();
    transport.hold("LIST a");
    let fetch = tokio::spawn({
        let discovery = discovery.clone();
        async move { discovery.fetch_children("a").await }
    });

    let fetching = wait_for(&mut changes, |s| s.resource("a").is_some_and(|a| a.fetching)).await;
    assert_eq!(fetching.revision(), revision.next());

    transport.release("LIST a");
    fetch.await.unwrap();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.revision(), revision.next().next());
    let a = snapshot.resource("a").unwrap();
    assert!(!a.fetching);
    assert_eq!(a.children, "a/2: Two\na/1: One".parse::<ResourceList>().unwrap());

    // Siblings are left alone.
    assert!(snapshot.resource("b").unwrap().children.is_empty());
}

#[tokio::test]
async fn concurrent_fetches_coalesce() {
    let transport = transport();
    transport.with_two_resources().with_list("a", "a/1: One");
    let (discovery, cache) = discovery(&transport);
    discovery.run().await;

    let mut changes = cache.subscribe();
    transport.hold("LIST a");
    let first = tokio::spawn({
        let discovery = discovery.clone();
        async move { discovery.fetch_children("a").await }
    });
    wait_for(&mut changes, |s| s.resource("a").is_some_and(|a| a.fetching)).await;

    let revision = cache.revision();
    discovery.fetch_children("a").await;
    assert_eq!(cache.revision(), revision);

    transport.release("LIST a");
    first.await.unwrap();

    assert_eq!(transport.count("LIST a"), 1);
    assert_eq!(cache.snapshot().resource("a").unwrap().children.len(), 1);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_children() {
    let transport = transport();
    transport.with_two_resources().with_list("a", "a/1: One\na/2: Two");
    let (discovery, cache) = discovery(&transport);
    discovery.run().await;
    discovery.fetch_children("a").await;
    let fetched = cache.snapshot().resource("a").cloned().unwrap();
    assert_eq!(fetched.children.len(), 2);
    let revision = cache.revision();

    transport.fail_list("a");
    discovery.fetch_children("a").await;

    assert_eq!(transport.count("LIST a"), 2);
    let snapshot = cache.snapshot();
    assert_eq!(snapshot.revision(), revision.next().next());
    let a = snapshot.resource("a").unwrap();
    assert!(!a.fetching);
    assert_eq!(a.children, fetched.children);
}

#[tokio::test]
async fn failed_first_fetch_lowers_flag() {
    let transport = transport();
    transport.with_two_resources();
    let (discovery, cache) = discovery(&transport);
    discovery.run().await;
    let revision = cache.revision();

    // `b` cannot be listed.
    discovery.fetch_children("b").await;

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.revision(), revision.next().next());
    let b = snapshot.resource("b").unwrap();
    assert!(!b.fetching);
    assert!(b.children.is_empty());
}

#[tokio::test]
async fn fetch_after_cancellation_is_discarded() {
    let transport = transport();
    transport.with_two_resources().with_list("a", "a/1: One");
    let (discovery, cache) = discovery(&transport);
    discovery.run().await;

    transport.hold("LIST a");
    let fetch = tokio::spawn({
        let discovery = discovery.clone();
        async move { discovery.fetch_children("a").await }
    });
    transport.wait_for_call("LIST a").await;

    discovery.cancel();
    let revision = cache.revision();
    transport.release("LIST a");
    fetch.await.unwrap();

    assert_eq!(cache.revision(), revision);
    assert!(cache.snapshot().resource("a").unwrap().children.is_empty());
}
