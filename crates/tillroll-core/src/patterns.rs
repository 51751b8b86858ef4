//! Pattern banks shared by the line classifier, fee/discount linker and product normalizer
//!
//! A `PatternBank` is compiled once and handed around behind an `Arc`. It never changes
//! after construction; merchant- or deployment-specific keywords are merged in from
//! `PatternExtras` (loaded from the pipeline config) at build time.

use std::collections::BTreeMap;
use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::Result;

/// Header/footer lines that never carry an item
const SKIP_PATTERNS: &[&str] = &[
    r"^\**\s*(?:SUB\s*-?\s*)?TOTAL\b",
    r"\bTOTAL\s+(?:TAX|SAVINGS|NUMBER|ITEMS)\b",
    r"^(?:SALES\s+)?TAX\s*[$\d.,%]*\s*[A-Z]?$",
    r"^(?:HST|GST|PST|QST|VAT)\b",
    r"^CHANGE\b",
    r"^CASH\b",
    r"\b(?:VISA|MASTERCARD|MASTER\s+CARD|AMEX|DISCOVER|DEBIT|CREDIT\s+CARD)\b",
    r"\bAPPROVED\b",
    r"\bAUTH(?:ORIZATION)?\b",
    r"THANK\s*YOU",
    r"^MEMBER\s*(?:NUMBER|ID|#)?\s*:?\s*\d+",
    r"ITEMS?\s+SOLD",
    r"YOU\s+SAVED",
    r"^BALANCE\b",
    r"^AMOUNT\b",
    r"\bTENDER(?:ED)?\b",
    r"CHIP\s+READ",
    r"^(?:AID|SEQ|APP|TC|REF)\s*#?\s*:",
    r"^(?:WHSE|TRN|OP|TERM|REG|STORE|LANE|CASHIER)\s*#?\s*:?\s*\d+",
    r"\bWHOLESALE\b",
    r"^(?:TEL|PHONE)\b",
    r"^\(?\d{3}\)?[-\s.]\d{3}[-.]\d{4}$",
    r"^\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
    r"^\d{1,2}:\d{2}(?::\d{2})?\s*(?:AM|PM)?$",
    r"[X*]{4,}\s*\d{2,4}",
    r"^[-=_*#~.]{3,}$",
    r"^\d{8,}$",
];

/// Fee keywords: positive additions tied to the product above them
const FEE_KEYWORDS: &[&str] = &[
    "ENVIRO FEE",
    "ENV FEE",
    "ECO FEE",
    "ENVIRONMENTAL",
    "EHF",
    "BOTTLE DEP",
    "CAN DEP",
    "DEPOSIT",
    "CRV",
    "CONTAINER FEE",
    "BAG FEE",
    "BAG CHARGE",
    "RECYCLING FEE",
    "RECYCLE FEE",
    "TIRE FEE",
    "BATTERY FEE",
    "FEE",
    "DEP",
];

/// Discount wording, applied to both raw lines and cleaned item names
const DISCOUNT_PATTERNS: &[&str] = &[
    r"^TPD\s*/?\s*\d+",
    r"\bTPD\b",
    r"\bDISCOUNT\b",
    r"\bCOUPON\b",
    r"\bCPN\b",
    r"^-",
    r"\d+\s*%?\s*OFF\b",
    r"MEMBER\s+SAVINGS",
    r"INSTANT\s+SAVINGS",
    r"\bSAVINGS\b",
    r"\bMARKDOWN\b",
    r"\bPROMO\b",
];

/// Receipt-level corrections
const ADJUSTMENT_PATTERNS: &[&str] = &[
    r"\bTAX\s+ADJ",
    r"\bVOID(?:ED)?\b",
    r"\bCORRECTION\b",
    r"\b(?:MGR|MANAGER)\s+(?:OVERRIDE|OVRD|ADJ)",
    r"\bOVERRIDE\b",
    r"\bPRICE\s+ADJ",
    r"\bADJUSTMENT\b",
];

/// (prefix pattern, brand, prefix is an abbreviation to strip from the product name)
const BRAND_PREFIXES: &[(&str, &str, bool)] = &[
    (r"^KIRKLAND(?:\s+SIGNATURE)?\b", "Kirkland Signature", true),
    (r"^KS\b", "Kirkland Signature", true),
    (r"^GREAT\s+VALUE\b", "Great Value", true),
    (r"^GV\b", "Great Value", true),
    (r"^TRADER\s+JOE'?S?\b", "Trader Joe's", true),
    (r"^TJ'?S?\b", "Trader Joe's", true),
    (r"^365\b", "365 by Whole Foods Market", true),
    (r"^GOOD\s*&\s*GATHER\b", "Good & Gather", true),
    (r"^GG\b", "Good & Gather", true),
    (r"^(?:MEMBERS?\s+MARK|MM)\b", "Member's Mark", true),
    (r"^PC\b", "President's Choice", true),
    (r"^KRAFT\b", "Kraft", false),
    (r"^TILLAMOOK\b", "Tillamook", false),
    (r"^CHOBANI\b", "Chobani", false),
    (r"^DANNON\b", "Dannon", false),
    (r"^(?:COKE|COCA\s*-?\s*COLA)\b", "Coca-Cola", false),
    (r"^PEPSI\b", "Pepsi", false),
    (r"^TYSON\b", "Tyson", false),
];

/// Category buckets, checked in order; a whole-token hit wins
const CATEGORY_BUCKETS: &[(&str, &[&str])] = &[
    (
        "Dairy",
        &[
            "MILK", "CHEESE", "YOGURT", "YOGHURT", "BUTTER", "CREAM", "EGG", "EGGS", "CHEDDAR",
            "MOZZ", "MOZZARELLA", "PARM", "KEFIR",
        ],
    ),
    (
        "Bakery",
        &[
            "BREAD", "BAGEL", "BAGELS", "MUFFIN", "MUFFINS", "CROISSANT", "CROISSANTS", "CAKE",
            "PIE", "ROLLS", "BUNS", "TORTILLA", "TORTILLAS", "BAGUETTE", "SOURDOUGH",
        ],
    ),
    (
        "Produce",
        &[
            "APPLE", "APPLES", "BANANA", "BANANAS", "GRAPES", "BERRIES", "STRAWBERRY",
            "STRAWBERRIES", "BLUEBERRIES", "AVOCADO", "AVOCADOS", "LETTUCE", "SPINACH",
            "TOMATO", "TOMATOES", "ONION", "ONIONS", "POTATO", "POTATOES", "CARROT", "CARROTS",
            "ORANGES", "LEMON", "LEMONS", "LIMES", "PEPPERS", "BROCCOLI", "CUCUMBER", "KALE",
            "SALAD",
        ],
    ),
    (
        "Meat",
        &[
            "BEEF", "CHICKEN", "PORK", "HAM", "TURKEY", "BACON", "SAUSAGE", "STEAK", "RIBEYE",
            "SIRLOIN", "BRISKET", "LAMB", "CHUCK", "WINGS", "THIGHS", "BREAST",
        ],
    ),
    (
        "Seafood",
        &["SALMON", "SHRIMP", "TUNA", "COD", "TILAPIA", "CRAB", "LOBSTER", "SCALLOPS"],
    ),
    (
        "Beverages",
        &[
            "WATER", "SODA", "JUICE", "COFFEE", "TEA", "COLA", "SPARKLING", "KOMBUCHA", "BEER",
            "WINE",
        ],
    ),
    (
        "Snacks",
        &[
            "CHIPS", "CRACKERS", "COOKIES", "PRETZELS", "POPCORN", "NUTS", "ALMONDS", "CASHEWS",
            "BARS", "CANDY", "CHOCOLATE", "JERKY",
        ],
    ),
    ("Frozen", &["FROZEN", "FRZ", "ICE", "PIZZA"]),
    (
        "Household",
        &[
            "TOWEL", "TOWELS", "TISSUE", "DETERGENT", "BLEACH", "SOAP", "DISH", "TRASH", "BAGS",
            "FOIL", "WRAP", "BATTERIES", "PAPER",
        ],
    ),
    (
        "Personal Care",
        &[
            "SHAMPOO", "CONDITIONER", "TOOTHPASTE", "DEODORANT", "LOTION", "RAZOR", "VITAMINS",
            "SUNSCREEN",
        ],
    ),
];

/// Additional keywords merged into the built-in banks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternExtras {
    pub skip_patterns: Vec<String>,
    pub fee_keywords: Vec<String>,
    pub discount_keywords: Vec<String>,
    pub adjustment_keywords: Vec<String>,
    /// prefix → brand
    pub brands: Vec<(String, String)>,
    /// category → extra keywords
    pub category_keywords: BTreeMap<String, Vec<String>>,
}

/// A brand inferred from an item name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandMatch {
    pub brand: String,
    /// Item name with an abbreviated store-brand prefix removed
    pub remainder: String,
}

#[derive(Debug)]
struct BrandRule {
    pattern: Regex,
    brand: String,
    strip_prefix: bool,
}

/// Immutable compiled pattern groups
#[derive(Debug)]
pub struct PatternBank {
    skip: Vec<Regex>,
    item_code: Regex,
    quantity: Regex,
    fee: Vec<Regex>,
    discount: Vec<Regex>,
    adjustment: Vec<Regex>,
    percent_off: Regex,
    discount_target: Regex,
    brands: Vec<BrandRule>,
    categories: Vec<(String, Vec<String>)>,
}

fn keyword_regex(keyword: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword.trim())))?)
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("(?i){}", pattern))?)
}

impl PatternBank {
    /// Built-in banks only
    pub fn standard() -> Result<Self> {
        Self::with_extras(&PatternExtras::default())
    }

    /// Built-in banks plus configured extras
    pub fn with_extras(extras: &PatternExtras) -> Result<Self> {
        let skip = SKIP_PATTERNS
            .iter()
            .copied()
            .chain(extras.skip_patterns.iter().map(String::as_str))
            .map(case_insensitive)
            .collect::<Result<Vec<_>>>()?;

        let fee = FEE_KEYWORDS
            .iter()
            .copied()
            .chain(extras.fee_keywords.iter().map(String::as_str))
            .map(keyword_regex)
            .collect::<Result<Vec<_>>>()?;

        let mut discount = DISCOUNT_PATTERNS
            .iter()
            .map(|p| case_insensitive(p))
            .collect::<Result<Vec<_>>>()?;
        for keyword in &extras.discount_keywords {
            discount.push(keyword_regex(keyword)?);
        }

        let mut adjustment = ADJUSTMENT_PATTERNS
            .iter()
            .map(|p| case_insensitive(p))
            .collect::<Result<Vec<_>>>()?;
        for keyword in &extras.adjustment_keywords {
            adjustment.push(keyword_regex(keyword)?);
        }

        // Configured brands first so deployments can override the built-ins
        let mut brands = Vec::new();
        for (prefix, brand) in &extras.brands {
            brands.push(BrandRule {
                pattern: case_insensitive(&format!(r"^{}\b", regex::escape(prefix.trim())))?,
                brand: brand.clone(),
                strip_prefix: false,
            });
        }
        for (pattern, brand, strip_prefix) in BRAND_PREFIXES {
            brands.push(BrandRule {
                pattern: case_insensitive(pattern)?,
                brand: brand.to_string(),
                strip_prefix: *strip_prefix,
            });
        }

        let mut categories: Vec<(String, Vec<String>)> = CATEGORY_BUCKETS
            .iter()
            .map(|(name, words)| {
                (
                    name.to_string(),
                    words.iter().map(|w| w.to_string()).collect(),
                )
            })
            .collect();
        for (name, words) in &extras.category_keywords {
            let upper: Vec<String> = words.iter().map(|w| w.trim().to_uppercase()).collect();
            match categories.iter_mut().find(|(c, _)| c.eq_ignore_ascii_case(name)) {
                Some((_, existing)) => existing.extend(upper),
                None => categories.push((name.clone(), upper)),
            }
        }

        Ok(Self {
            skip,
            item_code: Regex::new(r"(?i)^(?:[A-Z]\s+)?(\d{4,7})\s+(.*[A-Za-z].*)$")?,
            quantity: Regex::new(
                r"(?i)^(\d{1,3})\s*@\s*([$€£]?\d+(?:\.\d{1,2})?)\s*(?:/?\s*EA(?:CH)?)?\s*$",
            )?,
            fee,
            discount,
            adjustment,
            percent_off: Regex::new(r"(?i)(\d{1,3}(?:\.\d+)?)\s*%\s*OFF\b")?,
            discount_target: Regex::new(r"(?i)^TPD\s*/\s*(\d{4,})")?,
            brands,
            categories,
        })
    }

    pub fn is_skip(&self, line: &str) -> bool {
        self.skip.iter().any(|re| re.is_match(line))
    }

    /// Split `[E ]555107 BLK FRST HAM` into the item code and the rest of the line
    pub fn item_code_parts(&self, line: &str) -> Option<(String, String)> {
        let caps = self.item_code.captures(line.trim())?;
        Some((caps[1].to_string(), caps[2].trim().to_string()))
    }

    /// Split `2 @ 4.99` into quantity and unit price
    pub fn quantity_parts(&self, line: &str) -> Option<(u32, String)> {
        let caps = self.quantity.captures(line.trim())?;
        let qty: u32 = caps[1].parse().ok()?;
        if qty == 0 {
            return None;
        }
        Some((qty, caps[2].to_string()))
    }

    pub fn is_fee(&self, text: &str) -> bool {
        self.fee.iter().any(|re| re.is_match(text))
    }

    /// Byte offset of the earliest fee keyword in the text
    pub fn fee_start(&self, text: &str) -> Option<usize> {
        self.fee
            .iter()
            .filter_map(|re| re.find(text).map(|m| m.start()))
            .min()
    }

    pub fn is_discount(&self, text: &str) -> bool {
        self.discount.iter().any(|re| re.is_match(text.trim()))
    }

    pub fn is_adjustment(&self, text: &str) -> bool {
        self.adjustment.iter().any(|re| re.is_match(text.trim()))
    }

    /// Percentage of an `N% OFF` discount
    pub fn percent_off(&self, text: &str) -> Option<Decimal> {
        let caps = self.percent_off.captures(text)?;
        Decimal::from_str(&caps[1]).ok()
    }

    /// Item code referenced by a `TPD/<code>` discount
    pub fn discount_target_code(&self, text: &str) -> Option<String> {
        self.discount_target
            .captures(text.trim())
            .map(|caps| caps[1].to_string())
    }

    pub fn brand_for(&self, name: &str) -> Option<BrandMatch> {
        let name = name.trim();
        self.brands.iter().find_map(|rule| {
            let m = rule.pattern.find(name)?;
            let remainder = if rule.strip_prefix {
                name[m.end()..].trim().to_string()
            } else {
                name.to_string()
            };
            Some(BrandMatch {
                brand: rule.brand.clone(),
                remainder: if remainder.is_empty() {
                    name.to_string()
                } else {
                    remainder
                },
            })
        })
    }

    pub fn category_for(&self, name: &str) -> Option<&str> {
        let upper = name.to_uppercase();
        let tokens: Vec<&str> = upper
            .split(|c: char| c.is_whitespace() || c == '/' || c == '-' || c == '.')
            .filter(|t| !t.is_empty())
            .collect();

        self.categories
            .iter()
            .find(|(_, words)| words.iter().any(|w| tokens.contains(&w.as_str())))
            .map(|(category, _)| category.as_str())
    }
}
