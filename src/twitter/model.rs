//! Wire types for the v1.1 timeline endpoints (`tweet_mode=extended`).
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{MediaEntity, PostKind, RawPost, SharedPost, UrlEntity, VideoVariant};

const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Deserialize, Debug, Clone)]
pub struct ApiTweet {
    pub id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub user: ApiUser,
    #[serde(default)]
    pub entities: ApiEntities,
    #[serde(default)]
    pub extended_entities: Option<ApiExtendedEntities>,
    #[serde(default)]
    pub retweeted_status: Option<Box<ApiTweet>>,
    #[serde(default)]
    pub quoted_status: Option<Box<ApiTweet>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ApiUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ApiEntities {
    #[serde(default)]
    pub urls: Vec<ApiUrl>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expanded_url: Option<String>,
    #[serde(default)]
    pub indices: [usize; 2],
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ApiExtendedEntities {
    #[serde(default)]
    pub media: Vec<ApiMedia>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiMedia {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub media_url_https: String,
    #[serde(default)]
    pub indices: [usize; 2],
    #[serde(default)]
    pub video_info: Option<ApiVideoInfo>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiVideoInfo {
    #[serde(default)]
    pub variants: Vec<ApiVariant>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiVariant {
    #[serde(default)]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub url: String,
}

impl ApiTweet {
    fn body(&self) -> String {
        self.full_text
            .clone()
            .or_else(|| self.text.clone())
            .unwrap_or_default()
    }

    fn url_entities(&self) -> Vec<UrlEntity> {
        self.entities
            .urls
            .iter()
            .map(|u| UrlEntity {
                url: u.url.clone(),
                expanded_url: u
                    .expanded_url
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| u.url.clone()),
                indices: (u.indices[0], u.indices[1]),
            })
            .collect()
    }

    fn media_entities(&self) -> Option<Vec<MediaEntity>> {
        let ext = self.extended_entities.as_ref()?;
        Some(ext.media.iter().map(ApiMedia::to_entity).collect())
    }

    fn shared(&self) -> SharedPost {
        SharedPost {
            user_screen_name: self.user.screen_name.clone(),
            full_text: self.body(),
            urls: self.url_entities(),
            media: self.media_entities(),
        }
    }
}

impl ApiMedia {
    fn to_entity(&self) -> MediaEntity {
        let video_variants = self.video_info.as_ref().map(|info| {
            info.variants
                .iter()
                .map(|v| VideoVariant {
                    bitrate: v.bitrate,
                    url: v.url.clone(),
                })
                .collect()
        });
        MediaEntity {
            url: self.url.clone(),
            media_url_https: self.media_url_https.clone(),
            indices: (self.indices[0], self.indices[1]),
            video_variants,
        }
    }
}

/// Parse the API's `created_at`; unparseable values fall back to the epoch.
pub fn parse_created_at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

impl From<ApiTweet> for RawPost {
    fn from(tweet: ApiTweet) -> Self {
        // A retweet of a quote is still forwarded as a plain retweet.
        let kind = if let Some(rt) = &tweet.retweeted_status {
            PostKind::Retweet {
                of: Box::new(rt.shared()),
            }
        } else if let Some(quoted) = &tweet.quoted_status {
            PostKind::Quote {
                of: Box::new(quoted.shared()),
            }
        } else {
            PostKind::Original
        };

        RawPost {
            id: tweet.id,
            created_at: parse_created_at(&tweet.created_at),
            user_name: tweet.user.name.clone(),
            user_screen_name: tweet.user.screen_name.clone(),
            full_text: tweet.body(),
            urls: tweet.url_entities(),
            media: tweet.media_entities(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> RawPost {
        serde_json::from_value::<ApiTweet>(value).unwrap().into()
    }

    #[test]
    fn parses_twitter_timestamp() {
        let dt = parse_created_at("Wed Oct 10 20:19:24 +0000 2018");
        assert_eq!(dt, Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap());
        assert_eq!(parse_created_at("yesterday"), DateTime::<Utc>::default());
    }

    #[test]
    fn original_tweet_with_video() {
        let post = decode(json!({
            "id": 1050118621198921728i64,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "full_text": "launch https://t.co/vid",
            "user": { "name": "Space", "screen_name": "space" },
            "entities": { "urls": [] },
            "extended_entities": { "media": [{
                "url": "https://t.co/vid",
                "media_url_https": "https://pbs.twimg.com/thumb.jpg",
                "type": "video",
                "indices": [7, 23],
                "video_info": { "variants": [
                    { "bitrate": 320000, "content_type": "video/mp4", "url": "https://video.twimg.com/a.mp4" },
                    { "content_type": "application/x-mpegURL", "url": "https://video.twimg.com/a.m3u8" }
                ]}
            }]}
        }));

        assert_eq!(post.id, 1050118621198921728);
        assert_eq!(post.kind, PostKind::Original);
        assert_eq!(post.user_screen_name, "space");
        let media = post.media.unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].indices, (7, 23));
        let variants = media[0].video_variants.as_ref().unwrap();
        assert_eq!(variants[0].bitrate, Some(320000));
        assert_eq!(variants[1].bitrate, None);
    }

    #[test]
    fn variant_without_url_still_decodes() {
        let post = decode(json!({
            "id": 8,
            "full_text": "clip https://t.co/v",
            "user": { "name": "Eve", "screen_name": "eve" },
            "extended_entities": { "media": [{
                "url": "https://t.co/v",
                "media_url_https": "https://pbs.twimg.com/v.jpg",
                "indices": [5, 19],
                "video_info": { "variants": [
                    { "bitrate": 1 },
                    { "bitrate": 256000, "url": "https://video.twimg.com/low.mp4" }
                ]}
            }]}
        }));

        let media = post.media.unwrap();
        let variants = media[0].video_variants.as_ref().unwrap();
        assert_eq!(variants[0].url, "");
        assert_eq!(variants[1].url, "https://video.twimg.com/low.mp4");
    }

    #[test]
    fn retweet_takes_precedence_over_quote() {
        let post = decode(json!({
            "id": 2,
            "full_text": "RT @alice: hi",
            "user": { "name": "Carol", "screen_name": "carol" },
            "retweeted_status": {
                "id": 1,
                "full_text": "hi",
                "user": { "name": "Alice", "screen_name": "alice" }
            },
            "quoted_status": {
                "id": 0,
                "full_text": "older",
                "user": { "name": "Bob", "screen_name": "bob" }
            }
        }));

        match post.kind {
            PostKind::Retweet { of } => {
                assert_eq!(of.user_screen_name, "alice");
                assert_eq!(of.full_text, "hi");
                assert!(of.media.is_none());
            }
            other => panic!("expected retweet, got {:?}", other),
        }
    }

    #[test]
    fn quote_and_missing_expanded_url() {
        let post = decode(json!({
            "id": 3,
            "text": "look https://t.co/q",
            "user": { "name": "Dan", "screen_name": "dan" },
            "entities": { "urls": [{ "url": "https://t.co/q", "expanded_url": null, "indices": [5, 19] }] },
            "quoted_status": {
                "id": 1,
                "full_text": "quoted",
                "user": { "screen_name": "erin" },
                "extended_entities": { "media": [] }
            }
        }));

        assert_eq!(post.full_text, "look https://t.co/q");
        assert_eq!(post.urls[0].expanded_url, "https://t.co/q");
        match post.kind {
            PostKind::Quote { of } => {
                assert_eq!(of.user_screen_name, "erin");
                assert_eq!(of.media, Some(vec![]));
            }
            other => panic!("expected quote, got {:?}", other),
        }
    }
}
