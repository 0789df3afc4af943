//! Catalog endpoint types: `GET /albums/{id}` and `GET /search`.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Album {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub images: Vec<Image>,
    /// Absent on simplified albums such as search results.
    #[serde(default)]
    pub tracks: Option<Page<Track>>,
}

impl Album {
    /// Artist names joined for display.
    #[must_use]
    pub fn artist(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The largest image, which the service lists first.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.images.first().map(|image| image.url.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Track {
    /// Local files have no identifier.
    pub id: Option<String>,
    pub name: String,
    pub uri: String,
    pub track_number: u32,
    /// Only present when a market was given; absent means playable.
    #[serde(default)]
    pub is_playable: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Search {
    pub albums: Option<Page<Album>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_artists_and_picks_first_image() {
        let album: Album = serde_json::from_str(
            r#"{
                "id": "1",
                "uri": "spotify:album:1",
                "name": "Split",
                "artists": [{"name": "A"}, {"name": "B"}],
                "images": [{"url": "https://i/640"}, {"url": "https://i/300"}],
                "tracks": {"items": [
                    {"id": "t1", "name": "One", "uri": "spotify:track:t1", "track_number": 1, "is_playable": false},
                    {"id": "t2", "name": "Two", "uri": "spotify:track:t2", "track_number": 2}
                ]}
            }"#,
        )
        .unwrap();

        assert_eq!(album.artist(), "A, B");
        assert_eq!(album.image(), Some("https://i/640"));
        let tracks = album.tracks.unwrap().items;
        assert_eq!(tracks[0].is_playable, Some(false));
        assert_eq!(tracks[1].is_playable, None);
    }
}
