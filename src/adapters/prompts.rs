//! Prompt builders for generation requests.
//!
//! Kept short and deterministic. Every builder takes plain strings so the
//! engine never formats prompts itself.

use crate::adapters::ResearchOutput;
use crate::domain::Language;

/// Article excerpt length sent to scorers
const SCORING_EXCERPT_CHARS: usize = 2000;
/// Excerpt length for each side of a translation review
const TRANSLATION_EXCERPT_CHARS: usize = 800;
/// Excerpt length for SEO requests
const SEO_EXCERPT_CHARS: usize = 500;

/// Truncate on a char boundary, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn structure_for(category: &str) -> &'static str {
    match category {
        "crypto" => "headline; introduction; market highlights (price, market cap, volume, sentiment); technical analysis (support, resistance, trend); news and catalysts (regulation, technology, adoption); trading insights with risk considerations",
        "commodities" => "headline; introduction; price movement with historical context; technical analysis (patterns, support, resistance, momentum); fundamental factors (supply and demand, geopolitics, seasonality); trading outlook with key levels",
        _ => "headline; introduction; market highlights (price, change, support and resistance); technical analysis (RSI, MACD, moving averages); fundamental drivers (economic data, central banks, geopolitics); trading opportunities with risk management",
    }
}

/// Primary article prompt, grounded in the lane's research
pub fn article(category: &str, subject: &str, research: &ResearchOutput) -> String {
    let na = "N/A";
    format!(
        "Write a professional 500-word {category} trading article about {subject}.\n\n\
         MARKET DATA:\n\
         - Current price: {price}\n\
         - 24h change: {change}\n\
         - Key drivers: {drivers}\n\n\
         RESEARCH NOTES:\n{notes}\n\n\
         STRUCTURE: {structure}.\n\n\
         Tone: professional and trader-focused. Include concrete numbers and actionable insights. \
         Never promise profits or use gambling language.\n\n\
         Write the article now.",
        category = category,
        subject = subject,
        price = research.price.as_deref().unwrap_or(na),
        change = research.change.as_deref().unwrap_or(na),
        drivers = research.drivers.as_deref().unwrap_or(na),
        notes = if research.summary.trim().is_empty() {
            na.to_string()
        } else {
            truncate_chars(research.summary.trim(), SCORING_EXCERPT_CHARS)
        },
        structure = structure_for(category),
    )
}

fn translation_brief(language: &Language) -> &'static str {
    match language.key.as_str() {
        "arabic_gcc" => "Use Gulf Arabic (Khaleeji), not Modern Standard Arabic, written in Arabic script. Professional yet conversational. Use established Arabic trading terminology, emphasize regulation and transparency, and avoid any gambling references. Local currency examples (AED, SAR) are welcome.",
        "spanish" => "Use neutral Latin American Spanish, not Castilian. Dynamic, supportive and professional, aimed at traders in Mexico, Colombia, Argentina and Chile.",
        "portuguese" => "Use Brazilian Portuguese with \"você\". Friendly, motivational and professional, localized for Brazilian traders (BRL).",
        _ => "Keep the professional trading tone and all figures intact.",
    }
}

/// Translation prompt. `feedback` carries issues from a previous failed attempt.
pub fn translation(text: &str, language: &Language, category: &str, feedback: &[String]) -> String {
    let mut prompt = format!(
        "Translate this {} trading article into {}.\n\n{}\n\n\
         Translate the whole article. Keep headings, numbers and structure. \
         Do not leave placeholders or untranslated sections.",
        category,
        language.name,
        translation_brief(language)
    );

    if !feedback.is_empty() {
        prompt.push_str("\n\nA previous attempt was rejected. Fix these problems:\n");
        for item in feedback {
            prompt.push_str("- ");
            prompt.push_str(item);
            prompt.push('\n');
        }
    }

    prompt.push_str("\n\nARTICLE:\n");
    prompt.push_str(text);
    prompt
}

/// Primary article review prompt (0–100 across four 25-point criteria)
pub fn article_scoring(text: &str, category: &str, subject: &str) -> String {
    format!(
        "Review this {category} trading article about {subject} for publication quality.\n\n\
         ARTICLE:\n{excerpt}\n\n\
         Score 0-25 each for content accuracy, SEO and structure, brand voice \
         (professional, no guaranteed profits, compliant), and completeness. \
         quality_score is the sum (0-100).\n\n\
         Respond with JSON only:\n\
         ```json\n\
         {{\"quality_score\": 0, \"issues\": [], \"strengths\": [], \"improvements_needed\": []}}\n\
         ```",
        category = category,
        subject = subject,
        excerpt = truncate_chars(text, SCORING_EXCERPT_CHARS),
    )
}

/// Translation review prompt
pub fn translation_scoring(source: &str, translated: &str, language: &Language, category: &str) -> String {
    format!(
        "Validate this {name} translation of a {category} trading article.\n\n\
         ORIGINAL (English):\n{source}\n\n\
         TRANSLATION ({name}):\n{translated}\n\n\
         Evaluate accuracy, fluency, trading terminology and completeness.\n\n\
         Respond with JSON only:\n\
         ```json\n\
         {{\"quality_score\": 0, \"issues\": [], \"improvements_needed\": []}}\n\
         ```",
        name = language.name,
        category = category,
        source = truncate_chars(source, TRANSLATION_EXCERPT_CHARS),
        translated = truncate_chars(translated, TRANSLATION_EXCERPT_CHARS),
    )
}

/// Improvement prompt built from reviewer feedback
pub fn improvement(text: &str, category: &str, subject: &str, feedback: &[String]) -> String {
    let issues = if feedback.is_empty() {
        "- Tighten structure and add concrete, actionable detail\n".to_string()
    } else {
        feedback.iter().map(|f| format!("- {}\n", f)).collect()
    };

    format!(
        "Improve this {category} trading article about {subject}.\n\n\
         ISSUES TO FIX:\n{issues}\n\
         Keep 600-800 words, a professional tone, factual accuracy, clear headings \
         and no guaranteed profit claims.\n\n\
         Respond with the improved article only, no explanations.\n\n\
         ARTICLE:\n{text}",
        category = category,
        subject = subject,
        issues = issues,
        text = text,
    )
}

/// SEO metadata prompt
pub fn seo(text: &str, category: &str, subject: &str) -> String {
    format!(
        "Generate SEO metadata for this {category} article about {subject}.\n\n\
         - title: 50-60 characters, includes {subject}\n\
         - description: 150-160 characters with the primary keyword\n\
         - keywords: 5-7 entries\n\
         - image_alt: descriptive chart alt text including {subject}\n\n\
         ARTICLE:\n{excerpt}\n\n\
         Respond with JSON only:\n\
         {{\"title\": \"...\", \"description\": \"...\", \"keywords\": [\"...\"], \"image_alt\": \"...\"}}",
        category = category,
        subject = subject,
        excerpt = truncate_chars(text, SEO_EXCERPT_CHARS),
    )
}
