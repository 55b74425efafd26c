//! Candidate request URLs for the price-history endpoint.
//!
//! The marketplace sometimes rejects a query for a specific country or
//! currency while answering a less specific one, so each item is queried with
//! progressively fewer parameters.

use std::fmt;

pub const PRICE_HISTORY_URL: &str = "https://steamcommunity.com/market/pricehistory/";
pub const LISTINGS_URL: &str = "https://steamcommunity.com/market/listings";

/// Which parameters a candidate carries, most specific first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    CountryAndCurrency,
    CurrencyOnly,
    Bare,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateKind::CountryAndCurrency => "country+currency",
            CandidateKind::CurrencyOnly => "currency",
            CandidateKind::Bare => "bare",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub kind: CandidateKind,
    pub url: String,
}

/// Percent-encode a market hash name with no safe characters.
///
/// Spaces, pipes, slashes and punctuation are all escaped; only
/// `A-Z a-z 0-9 - _ . ~` pass through.
pub fn market_hash_quote(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Listing page for an item, sent as the `Referer` header.
pub fn listing_url(app_id: u32, item_name: &str) -> String {
    format!("{LISTINGS_URL}/{app_id}/{}", market_hash_quote(item_name))
}

/// Ordered candidates: country+currency, currency only, then neither.
pub fn build_candidates(
    app_id: u32,
    currency: u32,
    country: &str,
    item_name: &str,
) -> Vec<CandidateUrl> {
    let base = format!(
        "{PRICE_HISTORY_URL}?appid={app_id}&market_hash_name={}",
        market_hash_quote(item_name)
    );
    vec![
        CandidateUrl {
            kind: CandidateKind::CountryAndCurrency,
            url: format!("{base}&country={country}&currency={currency}"),
        },
        CandidateUrl {
            kind: CandidateKind::CurrencyOnly,
            url: format!("{base}&currency={currency}"),
        },
        CandidateUrl {
            kind: CandidateKind::Bare,
            url: base,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_everything_but_unreserved() {
        assert_eq!(
            market_hash_quote("AK-47 | Redline (Field-Tested)"),
            "AK-47%20%7C%20Redline%20%28Field-Tested%29"
        );
        assert_eq!(market_hash_quote("a/b"), "a%2Fb");
        assert_eq!(market_hash_quote("Man-o'-war"), "Man-o%27-war");
        assert_eq!(market_hash_quote("x_y.z~"), "x_y.z~");
    }

    #[test]
    fn candidates_in_decreasing_specificity() {
        let c = build_candidates(730, 3, "DE", "Kilowatt Case");
        let base = "https://steamcommunity.com/market/pricehistory/?appid=730&market_hash_name=Kilowatt%20Case";

        assert_eq!(c.len(), 3);
        assert_eq!(c[0].kind, CandidateKind::CountryAndCurrency);
        assert_eq!(c[0].url, format!("{base}&country=DE&currency=3"));
        assert_eq!(c[1].kind, CandidateKind::CurrencyOnly);
        assert_eq!(c[1].url, format!("{base}&currency=3"));
        assert_eq!(c[2].kind, CandidateKind::Bare);
        assert_eq!(c[2].url, base);
    }

    #[test]
    fn listing_url_encodes_name() {
        assert_eq!(
            listing_url(570, "Dragonclaw Hook"),
            "https://steamcommunity.com/market/listings/570/Dragonclaw%20Hook"
        );
    }
}
