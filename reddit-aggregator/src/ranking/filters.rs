use crate::types::{AnnotatedPost, Feed};
use chrono::{Days, LocalResult, NaiveDate, Offset, TimeZone, Timelike};
use std::collections::HashMap;

pub const ONE_DAY_SECS: i64 = 24 * 60 * 60;

/// The hour of day at which posts roll over into the next age bucket.
const DAY_BOUNDARY_HOUR: u32 = 3;

/// The next 03:00 local time at or after `now` (epoch seconds). Posts stored
/// in the day before this instant are 0 days old.
pub fn day_boundary<Tz: TimeZone>(now: i64, tz: &Tz) -> i64 {
    let local = match tz.timestamp_opt(now, 0) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t,
        LocalResult::None => return now,
    };
    let mut date: NaiveDate = local.date_naive();
    if local.hour() >= DAY_BOUNDARY_HOUR {
        date = date.checked_add_days(Days::new(1)).unwrap_or(date);
    }
    let Some(boundary) = date.and_hms_opt(DAY_BOUNDARY_HOUR, 0, 0) else {
        return now;
    };
    match tz.from_local_datetime(&boundary) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.timestamp(),
        // 03:00 skipped by a DST jump: use the wall-clock time with today's offset.
        LocalResult::None => {
            let offset = local.offset().fix().local_minus_utc() as i64;
            boundary.and_utc().timestamp() - offset
        }
    }
}

/// Age in whole days relative to `boundary`. Posts stored after the boundary
/// get negative ages, pushed one extra day out so they never land in bucket 0.
/// Rust's `/` truncates toward zero, which is the rounding wanted here.
pub fn decorate_post_age(boundary: i64, posts: &mut [AnnotatedPost]) {
    for post in posts.iter_mut() {
        let mut delta = boundary - post.post.time_stored;
        if delta < 0 {
            delta -= ONE_DAY_SECS;
        }
        post.age_in_days = delta / ONE_DAY_SECS;
    }
}

/// Keeps at most `max_daily_posts` of each subreddit's posts per age bucket,
/// highest scores first. Subreddits missing from the feed keep nothing.
pub fn filter_by_max_daily_posts(mut posts: Vec<AnnotatedPost>, feed: &Feed) -> Vec<AnnotatedPost> {
    let max_daily_posts: HashMap<&str, usize> = feed
        .subreddits
        .iter()
        .map(|s| (s.name.as_str(), s.max_daily_posts as usize))
        .collect();

    // id breaks score ties so the cut is reproducible.
    posts.sort_by(|a, b| {
        a.post
            .subreddit_name
            .cmp(&b.post.subreddit_name)
            .then_with(|| a.age_in_days.cmp(&b.age_in_days))
            .then_with(|| b.post.score.cmp(&a.post.score))
            .then_with(|| a.post.id.cmp(&b.post.id))
    });

    let mut results = Vec::with_capacity(posts.len());
    let mut bucket: Option<(String, i64)> = None;
    let mut daily_post_count = 0;
    for post in posts {
        let same_bucket = bucket
            .as_ref()
            .is_some_and(|(name, age)| *name == post.post.subreddit_name && *age == post.age_in_days);
        if !same_bucket {
            bucket = Some((post.post.subreddit_name.clone(), post.age_in_days));
            daily_post_count = 0;
        }
        daily_post_count += 1;
        let cap = max_daily_posts
            .get(post.post.subreddit_name.as_str())
            .copied()
            .unwrap_or(0);
        if daily_post_count <= cap {
            results.push(post);
        }
    }
    results
}

/// Freshest bucket first, newest first within a bucket.
pub fn sort_posts_into_display_order(posts: &mut [AnnotatedPost]) {
    posts.sort_by(|a, b| {
        a.age_in_days
            .cmp(&b.age_in_days)
            .then_with(|| b.post.time_stored.cmp(&a.post.time_stored))
            .then_with(|| a.post.id.cmp(&b.post.id))
    });
}

pub fn filter_out_missing_media(posts: Vec<AnnotatedPost>) -> Vec<AnnotatedPost> {
    posts
        .into_iter()
        .filter(|post| post.media_link.is_some())
        .collect()
}
