use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::Posting;
use crate::scrapers::detail_url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector is valid")
}

static CARD: LazyLock<Selector> = LazyLock::new(|| selector("div.base-search-card__info"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h3"));
static COMPANY: LazyLock<Selector> = LazyLock::new(|| selector("a.hidden-nested-link"));
static LOCATION: LazyLock<Selector> =
    LazyLock::new(|| selector("span.job-search-card__location"));
/// Older cards first, then cards flagged as new.
static DATES: LazyLock<[Selector; 2]> = LazyLock::new(|| {
    [
        selector("time.job-search-card__listdate"),
        selector("time.job-search-card__listdate--new"),
    ]
});

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Company links wrap their text across lines.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Numeric posting id from the card container's `data-entity-urn`
/// (`urn:li:jobPosting:3812345678` -> `3812345678`).
fn posting_id(card: ElementRef<'_>) -> Option<String> {
    let parent = card.parent().and_then(ElementRef::wrap)?;
    let urn = parent.value().attr("data-entity-urn")?;
    urn.rsplit(':')
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn posted_date(card: ElementRef<'_>) -> Option<NaiveDate> {
    DATES.iter().find_map(|sel| {
        card.select(sel)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    })
}

/// Parse all listing cards on a search page.
pub fn parse_cards(doc: &Html, detail_url_template: &str) -> Vec<Posting> {
    let mut postings = Vec::new();

    for card in doc.select(&CARD) {
        let Some(title) = card
            .select(&TITLE)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty())
        else {
            debug!("skipping card without title");
            continue;
        };

        let Some(id) = posting_id(card) else {
            debug!(%title, "skipping card without entity urn");
            continue;
        };

        let company = card
            .select(&COMPANY)
            .next()
            .map(|el| collapse_whitespace(&text_of(el)))
            .unwrap_or_default();
        let location = card.select(&LOCATION).next().map(text_of).unwrap_or_default();

        postings.push(Posting::new(
            title,
            company,
            location,
            posted_date(card),
            detail_url(detail_url_template, &id),
        ));
    }

    postings
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://www.linkedin.com/jobs/view/{id}/";

    fn card(urn: Option<&str>, title: &str, date_html: &str) -> String {
        let attr = urn
            .map(|u| format!(r#" data-entity-urn="{}""#, u))
            .unwrap_or_default();
        format!(
            r##"<li><div class="base-card"{attr}>
                <div class="base-search-card__info">
                  <h3 class="base-search-card__title">
                    {title}
                  </h3>
                  <h4><a class="hidden-nested-link" href="#">
                    Acme
                    Corp
                  </a></h4>
                  <div class="base-search-card__metadata">
                    <span class="job-search-card__location"> Paris, Île-de-France </span>
                    {date_html}
                  </div>
                </div>
              </div></li>"##
        )
    }

    #[test]
    fn test_parses_full_card() {
        let html = card(
            Some("urn:li:jobPosting:3812345678"),
            "Rust Developer",
            r#"<time class="job-search-card__listdate" datetime="2024-01-05">2 days ago</time>"#,
        );
        let postings = parse_cards(&Html::parse_document(&html), TEMPLATE);

        assert_eq!(postings.len(), 1);
        let p = &postings[0];
        assert_eq!(p.title, "Rust Developer");
        assert_eq!(p.company, "Acme Corp");
        assert_eq!(p.location, "Paris, Île-de-France");
        assert_eq!(p.posted_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(p.detail_url, "https://www.linkedin.com/jobs/view/3812345678/");
        assert!(p.description.is_none());
        assert!(!p.filtered);
    }

    #[test]
    fn test_new_listing_date_fallback() {
        let html = card(
            Some("urn:li:jobPosting:1"),
            "Dev",
            r#"<time class="job-search-card__listdate--new" datetime="2024-02-10">1 hour ago</time>"#,
        );
        let postings = parse_cards(&Html::parse_document(&html), TEMPLATE);
        assert_eq!(postings[0].posted_date, NaiveDate::from_ymd_opt(2024, 2, 10));
    }

    #[test]
    fn test_skips_cards_missing_title_or_urn() {
        let html = format!(
            "{}{}{}",
            card(None, "No Urn", ""),
            card(Some("urn:li:jobPosting:2"), "   ", ""),
            card(Some("urn:li:jobPosting:3"), "Kept", ""),
        );
        let postings = parse_cards(&Html::parse_document(&html), TEMPLATE);
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].title, "Kept");
        assert_eq!(postings[0].posted_date, None);
    }

    #[test]
    fn test_empty_page() {
        let postings = parse_cards(&Html::parse_document("<html></html>"), TEMPLATE);
        assert!(postings.is_empty());
    }
}
