use std::collections::HashMap;

use waypoint_core::config::CitiesConfig;

/// Maps a free-text city mention to a canonical city name.
pub trait CityResolver: Send + Sync {
    fn nearest(&self, name: &str) -> String;
}

/// Maps a canonical city name to the location code inventory providers use.
pub trait CityCodeLookup: Send + Sync {
    fn code_for(&self, canonical_name: &str) -> Option<String>;
}

impl CityCodeLookup for CitiesConfig {
    fn code_for(&self, canonical_name: &str) -> Option<String> {
        CitiesConfig::code_for(self, canonical_name).map(str::to_string)
    }
}

type TrigramVector = HashMap<String, f64>;

/// Nearest-neighbour city search over character trigram vectors. Inflected
/// forms ("Москву", "Казани") share most trigrams with their canonical name,
/// which is enough to recover it.
#[derive(Clone, Debug, Default)]
pub struct TrigramCityIndex {
    entries: Vec<(String, TrigramVector)>,
}

impl TrigramCityIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .map(|name| {
                let vector = trigram_vector(&name);
                (name, vector)
            })
            .collect();
        Self { entries }
    }

    pub fn from_cities(cities: &CitiesConfig) -> Self {
        Self::new(cities.codes.keys().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CityResolver for TrigramCityIndex {
    fn nearest(&self, name: &str) -> String {
        let query = trigram_vector(name);
        let mut best: Option<(&str, f64)> = None;

        for (candidate, vector) in &self.entries {
            let score = cosine(&query, vector);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate.as_str(), score));
            }
        }

        match best {
            Some((candidate, _)) => candidate.to_string(),
            None => name.trim().to_string(),
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace('ё', "е")
}

fn trigram_vector(name: &str) -> TrigramVector {
    let padded = format!(" {} ", normalize(name));
    let chars = padded.chars().collect::<Vec<_>>();
    let mut vector = TrigramVector::new();
    for window in chars.windows(3) {
        *vector.entry(window.iter().collect()).or_insert(0.0) += 1.0;
    }
    vector
}

fn cosine(left: &TrigramVector, right: &TrigramVector) -> f64 {
    let dot = left
        .iter()
        .filter_map(|(gram, weight)| right.get(gram).map(|other| weight * other))
        .sum::<f64>();
    let norm =
        |vector: &TrigramVector| vector.values().map(|value| value * value).sum::<f64>().sqrt();
    let denominator = norm(left) * norm(right);
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

#[cfg(test)]
mod tests {
    use waypoint_core::config::AppConfig;

    use super::{CityCodeLookup, CityResolver, TrigramCityIndex};

    fn index() -> TrigramCityIndex {
        TrigramCityIndex::from_cities(&AppConfig::default().cities)
    }

    #[test]
    fn inflected_names_resolve_to_canonical_city() {
        let index = index();
        assert_eq!(index.nearest("Москву"), "Москва");
        assert_eq!(index.nearest("Казани"), "Казань");
        assert_eq!(index.nearest("  сочи "), "Сочи");
        assert_eq!(index.nearest("Санкт-Петербурга"), "Санкт-Петербург");
    }

    #[test]
    fn empty_index_echoes_input() {
        let index = TrigramCityIndex::new(Vec::<String>::new());
        assert!(index.is_empty());
        assert_eq!(index.nearest(" Урюпинск "), "Урюпинск");
    }

    #[test]
    fn cities_config_supplies_codes() {
        let cities = AppConfig::default().cities;
        assert_eq!(CityCodeLookup::code_for(&cities, "Казань"), Some("KZN".to_string()));
        assert_eq!(CityCodeLookup::code_for(&cities, "Урюпинск"), None);
    }
}
