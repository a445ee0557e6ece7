//! Description language identification.

/// Code assumed when detection cannot decide.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Identifies the language of a text as an ISO 639-1 code.
pub trait LanguageDetector: Send + Sync {
    /// Returns `None` when the text is too short or ambiguous to classify.
    fn detect(&self, text: &str) -> Option<String>;

    /// Detected language, falling back to English.
    fn detect_or_default(&self, text: &str) -> String {
        self.detect(text)
            .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string())
    }
}

/// Trigram-based detection backed by whatlang.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        let code = info.lang().code();
        Some(iso639_1(code).unwrap_or(code).to_string())
    }
}

/// Map an ISO 639-3 code to its two-letter form where one exists.
fn iso639_1(code: &str) -> Option<&'static str> {
    let two = match code {
        "eng" => "en",
        "fra" => "fr",
        "deu" => "de",
        "spa" => "es",
        "ita" => "it",
        "por" => "pt",
        "nld" => "nl",
        "rus" => "ru",
        "ukr" => "uk",
        "pol" => "pl",
        "ces" => "cs",
        "slk" => "sk",
        "swe" => "sv",
        "dan" => "da",
        "nob" => "nb",
        "fin" => "fi",
        "ron" => "ro",
        "hun" => "hu",
        "tur" => "tr",
        "ell" => "el",
        "bul" => "bg",
        "hrv" => "hr",
        "srp" => "sr",
        "slv" => "sl",
        "lit" => "lt",
        "lav" => "lv",
        "est" => "et",
        "cat" => "ca",
        "ara" => "ar",
        "heb" => "he",
        "hin" => "hi",
        "cmn" => "zh",
        "jpn" => "ja",
        "kor" => "ko",
        "vie" => "vi",
        "tha" => "th",
        "ind" => "id",
        _ => return None,
    };
    Some(two)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english_and_french() {
        let detector = WhatlangDetector;
        assert_eq!(
            detector.detect_or_default(
                "We are looking for an experienced software engineer to join our growing team \
                 and help us build reliable distributed systems."
            ),
            "en"
        );
        assert_eq!(
            detector.detect_or_default(
                "Nous recherchons un développeur expérimenté pour rejoindre notre équipe \
                 et participer à la conception de nos services."
            ),
            "fr"
        );
    }

    #[test]
    fn test_undecidable_falls_back_to_english() {
        assert_eq!(WhatlangDetector.detect_or_default(""), "en");
    }

    #[test]
    fn test_unmapped_code_passes_through() {
        assert_eq!(iso639_1("eng"), Some("en"));
        assert_eq!(iso639_1("epo"), None);
    }
}
