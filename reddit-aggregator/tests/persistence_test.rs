mod common;

use common::*;
use reddit_aggregator::types::*;
use reddit_aggregator::persistence::MAX_CANDIDATE_POSTS;
use reddit_aggregator::Persistence;
use std::collections::HashMap;

const NOW: i64 = 1_700_000_000;

#[tokio::test]
async fn test_store_post_is_idempotent() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    let post = stored_post("pics", "abc", 10, NOW);

    assert_eq!(persistence.store_post(&post).await?, StoreResult::New);
    for _ in 0..3 {
        assert_eq!(persistence.store_post(&post).await?, StoreResult::Updated);
    }
    assert_eq!(persistence.count_posts().await?, 1);
    assert_eq!(persistence.get_posts_for_subreddit("pics").await?, vec![post]);
    Ok(())
}

#[tokio::test]
async fn test_update_rewrites_mutable_fields_only() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    let original = stored_post("pics", "abc", 10, NOW);
    persistence.store_post(&original).await?;

    let mut changed = original.clone();
    changed.score = 250;
    changed.title = "Edited".to_string();
    changed.is_active = false;
    changed.time_stored = NOW + 3600;
    changed.time_created = NOW + 3600;
    assert_eq!(persistence.store_post(&changed).await?, StoreResult::Updated);

    let stored = persistence
        .get_post("abc", "t5_pics")
        .await?
        .expect("post should be stored");
    assert_eq!(stored.score, 250);
    assert_eq!(stored.title, "Edited");
    assert!(!stored.is_active);
    assert_eq!(stored.time_stored, NOW);
    assert_eq!(stored.time_created, NOW);
    Ok(())
}

#[tokio::test]
async fn test_same_id_in_another_subreddit_is_a_new_post() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    persistence.store_post(&stored_post("pics", "abc", 1, NOW)).await?;

    let other = stored_post("aww", "abc", 1, NOW);
    assert_eq!(persistence.store_post(&other).await?, StoreResult::New);
    assert_eq!(persistence.count_posts().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_url_collision_skips_new_post() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    let url = "https://i.imgur.com/shared.jpg".to_string();

    let mut a = stored_post("pics", "a", 5, NOW);
    a.url = Some(url.clone());
    assert_eq!(persistence.store_post(&a).await?, StoreResult::New);

    let mut b = stored_post("aww", "b", 50, NOW);
    b.url = Some(url);
    assert_eq!(persistence.store_post(&b).await?, StoreResult::Skipped);
    assert!(persistence.get_post("b", "t5_aww").await?.is_none());

    let c = stored_post("aww", "c", 50, NOW);
    assert_eq!(persistence.store_post(&c).await?, StoreResult::New);
    assert_eq!(persistence.count_posts().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_posts_without_url_never_collide() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    for id in ["x", "y", "z"] {
        let mut post = stored_post("askreddit", id, 1, NOW);
        post.url = None;
        assert_eq!(persistence.store_post(&post).await?, StoreResult::New);
    }
    assert_eq!(persistence.count_posts().await?, 3);
    Ok(())
}

async fn seed_even_scores(persistence: &Persistence, subreddit: &str) -> Result<()> {
    for i in 1..=100 {
        let post = stored_post(subreddit, &format!("{}{}", subreddit, i), 2 * i, NOW);
        persistence.store_post(&post).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_score_at_percentile() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    seed_even_scores(&persistence, "pics").await?;
    let min_time = NOW - 60;

    assert_eq!(persistence.get_score_at_percentile(min_time, "pics", 70.0).await?, 60);
    assert_eq!(persistence.get_score_at_percentile(min_time, "pics", 50.0).await?, 100);
    assert_eq!(persistence.get_score_at_percentile(min_time, "pics", 30.0).await?, 140);
    assert_eq!(persistence.get_score_at_percentile(min_time, "pics", 100.0).await?, 0);
    assert_eq!(persistence.get_score_at_percentile(min_time, "pics", 101.0).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_score_at_percentile_is_monotonic() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    seed_even_scores(&persistence, "pics").await?;

    let mut previous = i64::MAX;
    for percentile in [1.0, 5.0, 12.5, 33.0, 50.0, 66.6, 90.0, 99.0, 99.9] {
        let score = persistence
            .get_score_at_percentile(NOW - 60, "pics", percentile)
            .await?;
        assert!(score <= previous, "percentile {} gave {}", percentile, score);
        previous = score;
    }
    Ok(())
}

#[tokio::test]
async fn test_score_at_percentile_ignores_old_inactive_and_other_posts() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    assert_eq!(persistence.get_score_at_percentile(NOW, "pics", 50.0).await?, 0);

    persistence.store_post(&stored_post("pics", "old", 1000, NOW - 86_400)).await?;
    let mut deleted = stored_post("pics", "deleted", 900, NOW);
    deleted.is_active = false;
    persistence.store_post(&deleted).await?;
    persistence.store_post(&stored_post("aww", "other", 800, NOW)).await?;
    persistence.store_post(&stored_post("pics", "kept", 7, NOW)).await?;

    assert_eq!(persistence.get_score_at_percentile(NOW - 60, "pics", 50.0).await?, 7);
    assert_eq!(persistence.get_score_at_percentile(NOW - 60, "empty", 50.0).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_posts_for_subreddit_scores() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    persistence.store_post(&stored_post("pics", "p1", 50, NOW - 10)).await?;
    persistence.store_post(&stored_post("pics", "p2", 5, NOW - 20)).await?;
    persistence.store_post(&stored_post("aww", "a1", 3, NOW - 30)).await?;
    persistence.store_post(&stored_post("aww", "a2", 3, NOW - 30)).await?;
    persistence.store_post(&stored_post("aww", "stale", 99, NOW - 10_000)).await?;
    persistence.store_post(&stored_post("funny", "f1", 500, NOW)).await?;

    let mut min_scores = HashMap::new();
    min_scores.insert("pics".to_string(), 10);
    min_scores.insert("aww".to_string(), 3);

    let posts = persistence
        .get_posts_for_subreddit_scores(NOW - 1000, &min_scores)
        .await?;
    let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "a1", "a2"]);

    assert!(persistence
        .get_posts_for_subreddit_scores(NOW - 1000, &HashMap::new())
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_tables_survive_reinitialisation() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    persistence.store_post(&stored_post("pics", "abc", 1, NOW)).await?;

    let reopened = Persistence::new(persistence.get_db_pool().clone()).await?;
    assert_eq!(reopened.count_posts().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_candidate_posts_are_capped_to_newest() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    let total = MAX_CANDIDATE_POSTS + 5;
    // Pairs of posts share a time_stored, alternating between two subreddits.
    for i in 0..total {
        let subreddit = if i % 2 == 0 { "pics" } else { "aww" };
        let post = stored_post(subreddit, &format!("p{:04}", i), 10, NOW - i / 2);
        persistence.store_post(&post).await?;
    }

    let mut min_scores = HashMap::new();
    min_scores.insert("pics".to_string(), 0);
    min_scores.insert("aww".to_string(), 0);
    let posts = persistence
        .get_posts_for_subreddit_scores(NOW - total, &min_scores)
        .await?;

    assert_eq!(posts.len() as i64, MAX_CANDIDATE_POSTS);
    let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    let expected: Vec<String> = (0..MAX_CANDIDATE_POSTS).map(|i| format!("p{:04}", i)).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(posts.windows(2).all(|w| w[0].time_stored >= w[1].time_stored));
    Ok(())
}

#[tokio::test]
async fn test_last_run_round_trip() -> Result<()> {
    init_tracing();
    let persistence = Persistence::open_in_memory().await?;
    assert_eq!(persistence.get_last_run("pics").await?, None);
    assert!(persistence.get_last_runs().await?.is_empty());

    persistence.upsert_last_run("pics", NOW).await?;
    persistence.upsert_last_run("aww", NOW - 60).await?;
    persistence.upsert_last_run("pics", NOW + 3600).await?;

    assert_eq!(persistence.get_last_run("pics").await?, Some(NOW + 3600));
    assert_eq!(persistence.get_last_run("aww").await?, Some(NOW - 60));

    let mut expected = HashMap::new();
    expected.insert("pics".to_string(), NOW + 3600);
    expected.insert("aww".to_string(), NOW - 60);
    assert_eq!(persistence.get_last_runs().await?, expected);

    let reopened = Persistence::new(persistence.get_db_pool().clone()).await?;
    assert_eq!(reopened.get_last_run("aww").await?, Some(NOW - 60));
    Ok(())
}
