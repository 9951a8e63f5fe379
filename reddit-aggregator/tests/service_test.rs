mod common;

use common::*;
use reddit_aggregator::types::*;
use reddit_aggregator::{FeedRegistry, HarvestService, Harvester, Persistence};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_service_harvests_immediately_and_shuts_down() -> Result<()> {
    init_tracing();
    let persistence = Arc::new(Persistence::open_in_memory().await?);
    let registry = Arc::new(FeedRegistry::new(vec![feed(
        "pics",
        MediaKind::Text,
        &[("pics", 50.0, 5)],
    )]));
    let listing = Arc::new(ScriptedListing::new());
    listing.push_page("pics", raw_page("pics", "a", 3));

    let mut harvester = Harvester::new(
        listing.clone(),
        persistence.clone(),
        registry.clone(),
        fast_harvest_config(),
    );
    harvester.add_source("pics");

    let service = HarvestService::spawn(harvester, Duration::from_secs(3600), persistence.clone());

    let mut waited = Duration::ZERO;
    while registry.list_feeds().await[0].time_last_harvested == 0 {
        assert!(waited < Duration::from_secs(5), "first harvest never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(persistence.count_posts().await?, 3);
    assert!(!service.is_finished());

    // The hour-long sleep is cut short.
    tokio::time::timeout(Duration::from_secs(5), service.shutdown())
        .await
        .expect("shutdown should not wait out the interval");

    assert_eq!(listing.calls().len(), 1);
    assert!(persistence.get_db_pool().is_closed());
    Ok(())
}
