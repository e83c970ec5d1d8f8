//! War-status polling: fetch the external feed, diff ownership against the
//! stored territories, and record captures.

use std::collections::HashMap;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use protocol::{Realm, ServerEvent};

use crate::auth_token::now_epoch;
use crate::context::ServerContext;
use crate::error::{GameServerError, Result};

/// Consecutive feed failures before the alarm log fires.
const FEED_ALARM_THRESHOLD: u32 = 3;

#[derive(Debug, Deserialize)]
struct WarStatusFeed {
    forts: Vec<WarStatusFort>,
}

#[derive(Debug, Deserialize)]
struct WarStatusFort {
    name: String,
    owner: String,
}

/// Pulls the territory id out of the trailing `(id)` in a feed name, e.g.
/// `"Stone Keep (17)"` → 17.
pub fn parse_territory_id(name: &str) -> Option<i64> {
    let open = name.rfind('(')?;
    let close = name.rfind(')')?;
    if close < open {
        return None;
    }
    name[open + 1..close].trim().parse().ok()
}

/// Ownership changes implied by the feed: `(territory_id, previous, new)`.
/// Entries with empty or unknown owners are ignored.
pub fn diff_ownership(
    feed: &[(i64, Realm)],
    current: &HashMap<i64, Realm>,
) -> Vec<(i64, Realm, Realm)> {
    feed.iter()
        .filter_map(|(territory_id, new_owner)| {
            let previous = current.get(territory_id)?;
            (previous != new_owner).then_some((*territory_id, *previous, *new_owner))
        })
        .collect()
}

pub fn spawn(ctx: ServerContext, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(ctx.config.ticks.territory_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let http = match reqwest::Client::builder()
            .timeout(ctx.config.war_status_timeout())
            .build()
        {
            Ok(http) => http,
            Err(err) => {
                log::error!("war-status client failed to build: {err}");
                return;
            }
        };

        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match run_tick(&ctx, &http).await {
                        Ok(captures) => {
                            consecutive_failures = 0;
                            if captures > 0 {
                                log::info!("war-status poll recorded {captures} captures");
                            }
                        }
                        Err(err) => {
                            consecutive_failures += 1;
                            // A flaky feed skips the tick; a dead one alarms.
                            if consecutive_failures >= FEED_ALARM_THRESHOLD {
                                log::error!(
                                    "war-status feed failing ({consecutive_failures} consecutive): {err}"
                                );
                            } else {
                                log::warn!("war-status poll failed: {err}");
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("territory worker stopping");
                        break;
                    }
                }
            }
        }
    })
}

async fn run_tick(ctx: &ServerContext, http: &reqwest::Client) -> Result<usize> {
    let feed: WarStatusFeed = http
        .get(&ctx.config.war_status.feed_url)
        .send()
        .await
        .map_err(|err| GameServerError::ExternalFeed(err.to_string()))?
        .json()
        .await
        .map_err(|err| GameServerError::ExternalFeed(err.to_string()))?;

    let mut observed = Vec::new();
    for fort in &feed.forts {
        if fort.owner.trim().is_empty() {
            continue;
        }
        let (Some(territory_id), Some(owner)) =
            (parse_territory_id(&fort.name), Realm::parse_name(&fort.owner))
        else {
            continue;
        };
        observed.push((territory_id, owner));
    }

    let territories = ctx.db.territories().all().await?;
    let current: HashMap<i64, Realm> = territories
        .iter()
        .filter_map(|row| Some((row.territory_id, Realm::parse_name(&row.owner_realm)?)))
        .collect();
    let names: HashMap<i64, String> = territories
        .iter()
        .map(|row| (row.territory_id, row.name.clone()))
        .collect();

    let changes = diff_ownership(&observed, &current);
    if changes.is_empty() {
        return Ok(0);
    }

    let now = now_epoch();
    for (territory_id, previous, new) in &changes {
        ctx.db
            .territories()
            .record_capture(*territory_id, *previous, *new, now)
            .await?;
        ctx.db.territories().set_owner(*territory_id, *new, now).await?;

        ctx.bus.broadcast_all(ServerEvent::TerritoriesCapture {
            territory_id: *territory_id,
            name: names.get(territory_id).cloned().unwrap_or_default(),
            previous_realm: *previous,
            new_realm: *new,
        });
    }

    ctx.cache.invalidate_territories().await;

    Ok(changes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn territory_id_parses_from_trailing_parens() {
        assert_eq!(parse_territory_id("Stone Keep (17)"), Some(17));
        assert_eq!(parse_territory_id("Watchtower (Old) (3)"), Some(3));
        assert_eq!(parse_territory_id("No id here"), None);
        assert_eq!(parse_territory_id("Bad (x)"), None);
        assert_eq!(parse_territory_id(""), None);
    }

    #[test]
    fn diff_reports_only_real_changes() {
        let mut current = HashMap::new();
        current.insert(17, Realm::A);
        current.insert(5, Realm::B);

        let feed = vec![(17, Realm::B), (5, Realm::B), (999, Realm::C)];
        let changes = diff_ownership(&feed, &current);

        assert_eq!(changes, vec![(17, Realm::A, Realm::B)]);
    }

    #[test]
    fn feed_json_shape_parses() {
        let feed: WarStatusFeed = serde_json::from_str(
            r#"{"forts": [{"name": "Keep (17)", "owner": "B"}, {"name": "Wall (2)", "owner": ""}]}"#,
        )
        .unwrap();

        assert_eq!(feed.forts.len(), 2);
        assert_eq!(feed.forts[0].owner, "B");
    }
}
