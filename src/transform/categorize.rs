//! Category inference and brewery-based estimates.

use std::sync::LazyLock;

use regex::Regex;

use super::record::Category;

/// Outcome of classifying one beer.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub confidence: f64,
}

const YEAST_CONFIDENCE: f64 = 0.9;
const STYLE_CONFIDENCE: f64 = 0.7;
const DEFAULT_CONFIDENCE: f64 = 0.5;

fn compile(category: Category, patterns: &[&str]) -> Vec<(Category, Regex)> {
    patterns
        .iter()
        .map(|p| (category, Regex::new(&format!("(?i){}", p)).unwrap()))
        .collect()
}

/// Yeast strain patterns, ale before lager.
static YEAST_PATTERNS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    let mut patterns = compile(
        Category::Ale,
        &[
            r"ale\s+yeast",
            r"top\s*ferment",
            r"saccharomyces\s+cerevisiae",
            r"wyeast\s+\d+",
            r"white\s+labs\s+wlp",
            r"nottingham",
            r"safale",
            r"us-05",
            r"windsor",
        ],
    );
    patterns.extend(compile(
        Category::Lager,
        &[
            r"lager\s+yeast",
            r"bottom\s*ferment",
            r"saccharomyces\s+pastorianus",
            r"saflager",
            r"w-34/70",
            r"pilsner\s+yeast",
        ],
    ));
    patterns
});

/// Style keywords looked for in name, tagline and description.
static STYLE_PATTERNS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    let mut patterns = compile(
        Category::Ale,
        &[
            r"ipa",
            r"pale\s+ale",
            r"bitter",
            r"porter",
            r"stout",
            r"wheat\s+beer",
            r"hefeweizen",
            r"saison",
            r"belgian",
            r"amber\s+ale",
            r"brown\s+ale",
            r"barley\s+wine",
        ],
    );
    patterns.extend(compile(
        Category::Lager,
        &[
            r"pilsner",
            r"pilsener",
            r"helles",
            r"märzen",
            r"oktoberfest",
            r"bock",
            r"schwarzbier",
        ],
    ));
    patterns
});

fn first_match(patterns: &[(Category, Regex)], text: &str) -> Option<Category> {
    patterns
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
}

/// Classify by yeast strain first, then by style keywords, else `Other`.
pub fn classify(yeast: Option<&str>, style_text: &str) -> Classification {
    if let Some(category) = yeast.and_then(|y| first_match(&YEAST_PATTERNS, y)) {
        return Classification {
            category,
            confidence: YEAST_CONFIDENCE,
        };
    }
    if let Some(category) = first_match(&STYLE_PATTERNS, style_text) {
        return Classification {
            category,
            confidence: STYLE_CONFIDENCE,
        };
    }
    Classification {
        category: Category::Other,
        confidence: DEFAULT_CONFIDENCE,
    }
}

/// Category implied by a brewery's type.
pub fn brewery_category(brewery_type: &str) -> Category {
    match brewery_type {
        "micro" | "nano" | "brewpub" | "taproom" => Category::Ale,
        "regional" | "large" | "beergarden" => Category::Lager,
        _ => Category::Other,
    }
}

/// States with a strong craft scene; house beers there skew stronger.
const CRAFT_STATES: &[&str] = &[
    "california",
    "colorado",
    "oregon",
    "washington",
    "vermont",
    "maine",
];

fn is_craft_state(state: Option<&str>) -> bool {
    state.is_some_and(|s| CRAFT_STATES.contains(&s.trim().to_lowercase().as_str()))
}

/// Estimated ABV for a brewery's house beer, rounded to one decimal.
pub fn estimate_abv(brewery_type: &str, category: Category, state: Option<&str>) -> f64 {
    let base = match brewery_type {
        "micro" => 5.8,
        "nano" => 6.2,
        "regional" => 4.9,
        "brewpub" => 5.4,
        "large" => 4.6,
        _ => match category {
            Category::Ale => 5.5,
            Category::Lager => 4.8,
            Category::Other => 5.0,
        },
    };
    let abv = if is_craft_state(state) { base + 0.3 } else { base };
    (abv * 10.0_f64).round() / 10.0
}

/// Estimated IBU for a brewery's house beer.
pub fn estimate_ibu(brewery_type: &str, category: Category, state: Option<&str>) -> f64 {
    let base = match brewery_type {
        "micro" => 42.0,
        "nano" => 38.0,
        "regional" => 28.0,
        "brewpub" => 35.0,
        "large" => 22.0,
        _ => match category {
            Category::Ale => 35.0,
            Category::Lager => 25.0,
            Category::Other => 30.0,
        },
    };
    if is_craft_state(state) {
        base + 5.0
    } else {
        base
    }
}

/// Suggested pairings for synthesized records.
pub fn food_pairing(category: Category) -> Vec<String> {
    let pairings: &[&str] = match category {
        Category::Ale => &["Grilled burgers", "Spicy wings", "Sharp cheddar", "BBQ ribs"],
        Category::Lager => &[
            "Fish and chips",
            "Light salads",
            "Grilled chicken",
            "Soft pretzels",
        ],
        Category::Other => &[
            "Artisanal cheese",
            "Charcuterie",
            "Seasonal dishes",
            "Experimental cuisine",
        ],
    };
    pairings.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yeast_wins_over_style() {
        let c = classify(Some("Wyeast 1056 - American Ale"), "A crisp pilsner");
        assert_eq!(c.category, Category::Ale);
        assert_eq!(c.confidence, 0.9);

        let c = classify(Some("Saflager W-34/70"), "Imperial IPA");
        assert_eq!(c.category, Category::Lager);
    }

    #[test]
    fn test_style_fallback() {
        let c = classify(Some("house strain"), "Punk IPA - Post Modern Classic");
        assert_eq!(c.category, Category::Ale);
        assert_eq!(c.confidence, 0.7);

        let c = classify(None, "Our Oktoberfest MÄRZEN");
        assert_eq!(c.category, Category::Lager);
    }

    #[test]
    fn test_unclassifiable_is_other() {
        let c = classify(None, "Fruit sour with rhubarb");
        assert_eq!(c.category, Category::Other);
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn test_brewery_category() {
        assert_eq!(brewery_category("micro"), Category::Ale);
        assert_eq!(brewery_category("taproom"), Category::Ale);
        assert_eq!(brewery_category("regional"), Category::Lager);
        assert_eq!(brewery_category("contract"), Category::Other);
        assert_eq!(brewery_category("closed"), Category::Other);
    }

    #[test]
    fn test_estimates_with_craft_bump() {
        assert_eq!(estimate_abv("micro", Category::Ale, Some("Ohio")), 5.8);
        assert_eq!(estimate_abv("micro", Category::Ale, Some("Oregon")), 6.1);
        assert_eq!(estimate_ibu("micro", Category::Ale, Some("oregon")), 47.0);
        assert_eq!(estimate_abv("taproom", Category::Ale, None), 5.5);
        assert_eq!(estimate_ibu("bar", Category::Other, None), 30.0);
    }
}
