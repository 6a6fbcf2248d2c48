//! Stats parser: thing responses into `StatsRecord`
//!
//! Never fails. Missing sections come out as `None`/zero/empty, and numeric
//! attributes that do not parse degrade the same way (never to `NaN`).

use crate::bgg::xml::{CollectionItem, Poll, Ratings, ThingItem, ValueNode};
use crate::models::{AgeVote, PlayerVotes, StatsRecord};

const PLAYER_COUNT_POLL: &str = "suggested_numplayers";
const PLAYER_AGE_POLL: &str = "suggested_playerage";
const EXPANSION_TYPE: &str = "boardgameexpansion";

/// Parse a decimal attribute; absent, empty or non-finite values are `None`
pub fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Parse a count attribute; anything unparsable counts as 0
pub fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0)
}

fn node_decimal(node: Option<&ValueNode>) -> Option<f64> {
    parse_decimal(node.and_then(ValueNode::as_str))
}

fn node_count(node: Option<&ValueNode>) -> i64 {
    parse_count(node.and_then(ValueNode::as_str))
}

/// Convert one thing item into a statistics record
pub fn parse_thing_stats(item: &ThingItem) -> StatsRecord {
    let ratings = item.statistics.as_ref().and_then(|s| s.ratings.as_ref());

    let mut stats = match ratings {
        Some(r) => ratings_record(r),
        None => StatsRecord::default(),
    };

    if let Some(poll) = find_poll(&item.polls, PLAYER_COUNT_POLL) {
        stats.player_ratings = player_count_votes(poll);
    }
    if let Some(poll) = find_poll(&item.polls, PLAYER_AGE_POLL) {
        stats.suggested_player_ages = player_age_votes(poll);
    }
    stats.base_game_id = base_game_id(item);

    stats
}

fn ratings_record(r: &Ratings) -> StatsRecord {
    StatsRecord {
        bgg_rating: node_decimal(r.average.as_ref()),
        bayes_average: node_decimal(r.bayesaverage.as_ref()),
        std_deviation: node_decimal(r.stddev.as_ref()),
        users_rated: node_count(r.usersrated.as_ref()),
        average_weight: node_decimal(r.averageweight.as_ref()),
        num_weights: node_count(r.numweights.as_ref()),
        ..StatsRecord::default()
    }
}

fn find_poll<'a>(polls: &'a [Poll], name: &str) -> Option<&'a Poll> {
    polls.iter().find(|p| p.name == name)
}

/// Buckets like "4+" have no numeric player count and are dropped
fn player_count_votes(poll: &Poll) -> std::collections::BTreeMap<u32, PlayerVotes> {
    poll.results
        .iter()
        .filter_map(|bucket| {
            let count = bucket.num_players.as_deref()?.trim().parse::<u32>().ok()?;
            let votes_for = |label: &str| {
                parse_count(
                    bucket
                        .results
                        .iter()
                        .find(|r| r.value.as_deref() == Some(label))
                        .and_then(|r| r.num_votes.as_deref()),
                )
            };
            Some((
                count,
                PlayerVotes {
                    best: votes_for("Best"),
                    recommended: votes_for("Recommended"),
                    not_recommended: votes_for("Not Recommended"),
                },
            ))
        })
        .collect()
}

/// Ages come as "2", "3", ... "21 and up"; the leading number is the age
fn player_age_votes(poll: &Poll) -> Vec<AgeVote> {
    let mut ages: Vec<AgeVote> = poll
        .results
        .iter()
        .flat_map(|bucket| bucket.results.iter())
        .filter_map(|r| {
            let age = leading_number(r.value.as_deref()?)?;
            Some(AgeVote {
                age,
                votes: parse_count(r.num_votes.as_deref()),
            })
        })
        .collect();
    ages.sort_by_key(|a| a.age);
    ages
}

fn leading_number(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed.get(..end)?.parse().ok()
}

fn is_expansion(item: &ThingItem) -> bool {
    item.item_type.as_deref() == Some(EXPANSION_TYPE)
        || item.subtype.as_deref() == Some(EXPANSION_TYPE)
}

/// Expansions point at their base game with an inbound expansion link
fn base_game_id(item: &ThingItem) -> Option<i64> {
    if !is_expansion(item) {
        return None;
    }
    item.links
        .iter()
        .find(|l| {
            l.link_type.as_deref() == Some(EXPANSION_TYPE) && l.inbound.as_deref() == Some("true")
        })
        .and_then(|l| l.id.as_deref())
        .and_then(|id| id.trim().parse().ok())
}

/// Rating aggregates carried by a collection entry, used when no thing
/// response is available for a game not yet in the store
pub fn collection_stats(item: &CollectionItem) -> StatsRecord {
    let rating = item.stats.as_ref().and_then(|s| s.rating.as_ref());
    match rating {
        Some(r) => StatsRecord {
            bgg_rating: node_decimal(r.average.as_ref()),
            bayes_average: node_decimal(r.bayesaverage.as_ref()),
            std_deviation: node_decimal(r.stddev.as_ref()),
            users_rated: node_count(r.usersrated.as_ref()),
            ..StatsRecord::default()
        },
        None => StatsRecord::default(),
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
