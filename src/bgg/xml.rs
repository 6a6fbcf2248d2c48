//! Typed views of the BGG XML API v2 documents
//!
//! Every section BGG may leave out is an `Option` or a defaulted `Vec`, so
//! consumers handle "absent" explicitly instead of walking an untyped tree.
//! Numeric values stay as the raw attribute strings; `bgg::stats` decides how
//! unparsable values degrade.

use serde::Deserialize;

use crate::error::Result;

/// `<element value="..."/>`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueNode {
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
}

impl ValueNode {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// `<name sortindex="1">Catan</name>`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextNode {
    #[serde(rename = "$text", default)]
    pub text: String,
}

// ── /collection ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CollectionDocument {
    #[serde(rename = "item", default)]
    items: Vec<CollectionItem>,
}

/// One entry of the owned-items collection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionItem {
    #[serde(rename = "@objectid", default)]
    pub object_id: String,
    #[serde(rename = "@subtype", default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub name: Option<TextNode>,
    #[serde(default)]
    pub yearpublished: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub stats: Option<CollectionStats>,
}

impl CollectionItem {
    /// Numeric BGG id, `None` when the attribute is missing or garbage
    pub fn bgg_id(&self) -> Option<i64> {
        self.object_id.trim().parse().ok()
    }

    pub fn name(&self) -> &str {
        self.name.as_ref().map(|n| n.text.trim()).unwrap_or_default()
    }
}

/// `<stats minplayers=".." ...><rating value="..">...</rating></stats>`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionStats {
    #[serde(rename = "@minplayers", default)]
    pub min_players: Option<String>,
    #[serde(rename = "@maxplayers", default)]
    pub max_players: Option<String>,
    #[serde(rename = "@minplaytime", default)]
    pub min_playtime: Option<String>,
    #[serde(rename = "@maxplaytime", default)]
    pub max_playtime: Option<String>,
    #[serde(rename = "@playingtime", default)]
    pub playing_time: Option<String>,
    #[serde(rename = "@numowned", default)]
    pub num_owned: Option<String>,
    #[serde(default)]
    pub rating: Option<CollectionRating>,
}

/// The owner's rating plus the community aggregates BGG attaches to it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionRating {
    /// Owner's rating, `N/A` when unrated
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
    #[serde(default)]
    pub usersrated: Option<ValueNode>,
    #[serde(default)]
    pub average: Option<ValueNode>,
    #[serde(default)]
    pub bayesaverage: Option<ValueNode>,
    #[serde(default)]
    pub stddev: Option<ValueNode>,
}

// ── /thing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ThingDocument {
    #[serde(rename = "item", default)]
    items: Vec<ThingItem>,
}

/// One `<item>` of a thing response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThingItem {
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(rename = "@type", default)]
    pub item_type: Option<String>,
    #[serde(rename = "@subtype", default)]
    pub subtype: Option<String>,
    #[serde(rename = "poll", default)]
    pub polls: Vec<Poll>,
    #[serde(rename = "link", default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub ratings: Option<Ratings>,
}

/// `<ratings>` block of a thing response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ratings {
    #[serde(default)]
    pub usersrated: Option<ValueNode>,
    #[serde(default)]
    pub average: Option<ValueNode>,
    #[serde(default)]
    pub bayesaverage: Option<ValueNode>,
    #[serde(default)]
    pub stddev: Option<ValueNode>,
    #[serde(default)]
    pub numweights: Option<ValueNode>,
    #[serde(default)]
    pub averageweight: Option<ValueNode>,
}

/// `<poll name="suggested_numplayers">` and friends
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Poll {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "results", default)]
    pub results: Vec<PollResults>,
}

/// One bucket of a poll; only the player count poll labels its buckets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollResults {
    #[serde(rename = "@numplayers", default)]
    pub num_players: Option<String>,
    #[serde(rename = "result", default)]
    pub results: Vec<PollResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollResult {
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
    #[serde(rename = "@numvotes", default)]
    pub num_votes: Option<String>,
}

/// `<link type="boardgameexpansion" id="13" inbound="true"/>`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(rename = "@type", default)]
    pub link_type: Option<String>,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(rename = "@inbound", default)]
    pub inbound: Option<String>,
}

/// Parse a collection document into its items
pub fn parse_collection(xml: &str) -> Result<Vec<CollectionItem>> {
    let document: CollectionDocument = quick_xml::de::from_str(xml)?;
    Ok(document.items)
}

/// Parse a thing document, returning its first item
pub fn parse_thing(xml: &str) -> Result<Option<ThingItem>> {
    let document: ThingDocument = quick_xml::de::from_str(xml)?;
    Ok(document.items.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_parses_items_and_ignores_unknown_elements() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<items totalitems="2" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
  <item objecttype="thing" objectid="13" subtype="boardgame" collid="1">
    <name sortindex="1">CATAN</name>
    <yearpublished>1995</yearpublished>
    <image>https://cf.geekdo-images.com/catan.jpg</image>
    <thumbnail>https://cf.geekdo-images.com/catan_t.jpg</thumbnail>
    <stats minplayers="3" maxplayers="4" minplaytime="60" maxplaytime="120" playingtime="120" numowned="200000">
      <rating value="8">
        <usersrated value="120000"/>
        <average value="7.1"/>
        <bayesaverage value="6.9"/>
        <stddev value="1.4"/>
        <median value="0"/>
      </rating>
    </stats>
    <status own="1" prevowned="0" fortrade="0"/>
    <numplays>3</numplays>
  </item>
  <item objecttype="thing" objectid="822" subtype="boardgame" collid="2">
    <name sortindex="1">Carcassonne</name>
  </item>
</items>"#;

        let items = parse_collection(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].bgg_id(), Some(13));
        assert_eq!(items[0].name(), "CATAN");
        assert_eq!(items[0].yearpublished.as_deref(), Some("1995"));
        let stats = items[0].stats.as_ref().unwrap();
        assert_eq!(stats.max_players.as_deref(), Some("4"));
        let rating = stats.rating.as_ref().unwrap();
        assert_eq!(rating.value.as_deref(), Some("8"));
        assert_eq!(rating.average.as_ref().unwrap().as_str(), Some("7.1"));
        assert!(items[1].stats.is_none());
    }

    #[test]
    fn empty_collection_has_no_items() {
        let xml = r#"<items totalitems="0" termsofuse="x"></items>"#;
        assert!(parse_collection(xml).unwrap().is_empty());
    }

    #[test]
    fn thing_keeps_polls_split_by_poll_summary() {
        let xml = r#"<items termsofuse="x">
  <item type="boardgame" id="13">
    <poll name="suggested_numplayers" title="t" totalvotes="1">
      <results numplayers="1"><result value="Best" numvotes="0"/></results>
    </poll>
    <poll-summary name="suggested_numplayers" title="t"><result name="bestwith" value="Best with 4"/></poll-summary>
    <poll name="suggested_playerage" title="t" totalvotes="1">
      <results><result value="10" numvotes="4"/></results>
    </poll>
    <link type="boardgamecategory" id="1021" value="Economic"/>
  </item>
</items>"#;

        let item = parse_thing(xml).unwrap().unwrap();
        assert_eq!(item.polls.len(), 2);
        assert_eq!(item.polls[1].name, "suggested_playerage");
        assert_eq!(item.links.len(), 1);
        assert!(item.statistics.is_none());
    }

    #[test]
    fn thing_without_items_is_none() {
        let xml = r#"<items termsofuse="x"></items>"#;
        assert!(parse_thing(xml).unwrap().is_none());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(parse_collection("<items><item objectid=").is_err());
    }
}
