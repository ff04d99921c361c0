use serde::{Deserialize, Serialize};

/// Image URIs attached to a card or one of its faces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUris {
    pub normal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub art_crop: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardFace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uris: Option<ImageUris>,
}

/// A card returned by the Scryfall search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScryfallCard {
    pub id: String,
    pub name: String,
    pub set_name: String,
    pub lang: String,
    pub prints_search_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uris: Option<ImageUris>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_faces: Option<Vec<CardFace>>,
}

/// One printed variant of a card (any set, any language).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardPrint {
    pub id: String,
    pub name: String,
    pub set_name: String,
    pub lang: String,
    pub set: String,
    pub collector_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uris: Option<ImageUris>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_faces: Option<Vec<CardFace>>,
}

/// Double-faced cards carry their images per face rather than at the top level.
fn normal_image<'a>(
    image_uris: Option<&'a ImageUris>,
    card_faces: Option<&'a [CardFace]>,
) -> Option<&'a str> {
    image_uris
        .or_else(|| card_faces?.first()?.image_uris.as_ref())
        .map(|uris| uris.normal.as_str())
}

impl ScryfallCard {
    pub fn normal_image_url(&self) -> Option<&str> {
        normal_image(self.image_uris.as_ref(), self.card_faces.as_deref())
    }
}

impl CardPrint {
    /// The image used as the face-swap target.
    pub fn normal_image_url(&self) -> Option<&str> {
        normal_image(self.image_uris.as_ref(), self.card_faces.as_deref())
    }
}

/// Envelope of every Scryfall list response.
#[derive(Debug, Deserialize)]
pub struct ScryfallList<T> {
    pub data: Option<Vec<T>>,
}
