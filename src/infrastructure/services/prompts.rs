//! Prompt text for evaluation, scoring, reasoning, dedup, questions and market sizing


use crate::domain::evaluation::{format_score, CategoryScore, ScoringCategory, Topic};

pub const ANALYST_SYSTEM: &str =
    "You are an expert analyst evaluating a company from its own documents. \
     Be specific and cite evidence from the context.";

pub const QUESTION_SYSTEM: &str =
    "You are an expert assistant for company analysis and due diligence. \
     Respond in the same language as the user's question.";

const NO_EVIDENCE: &str = "No web validation available";

/// Retrieved chunks as one context block
pub fn join_context(chunks: &[String]) -> String {
    chunks.join("\n\n---\n\n")
}

fn evidence_or_placeholder(evidence: &str) -> &str {
    if evidence.trim().is_empty() {
        NO_EVIDENCE
    } else {
        evidence
    }
}

pub fn analysis_prompt(topic: &Topic, evidence: &str) -> String {
    let mut prompt = format!(
        "Question/Task: {}\n\n\
         Based on the provided context, give a focused analysis including:\n\
         1. Key insights\n\
         2. Strengths\n\
         3. Weaknesses\n\
         4. Opportunities\n\
         5. Potential risks or red flags",
        topic.query
    );

    if !evidence.trim().is_empty() {
        prompt.push_str("\n\nExternal validation (use it to confirm or challenge the documents):\n");
        prompt.push_str(evidence);
    }

    prompt
}

pub fn scoring_prompt(category: &ScoringCategory, context: &str, evidence: &str) -> String {
    let criteria = category
        .criteria
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Score this company on the {name} dimension.\n\n\
         SOURCE 1 (INTERNAL DOCUMENTS - primary truth):\n{context}\n\n\
         SOURCE 2 (WEB VALIDATION - reality check):\n{evidence}\n\n\
         EVALUATION CRITERIA:\n{criteria}\n\n\
         RULES:\n\
         1. Base the score on SOURCE 1.\n\
         2. Use SOURCE 2 to validate: reduce the score when it contradicts the documents, \
         keep or raise it when it confirms them.\n\
         3. Penalize discrepancies between the documents and reality.\n\n\
         SCALE: 90-100 exceptional, 80-89 excellent, 70-79 good, 60-69 adequate, \
         50-59 below average, 0-49 weak.\n\n\
         Give a score from 0 to 100, a 2-3 sentence justification citing evidence, \
         and up to three key factors.",
        name = category.id.replace('_', " "),
        context = context,
        evidence = evidence_or_placeholder(evidence),
        criteria = criteria,
    )
}

pub fn reasoning_prompt(
    entity_name: &str,
    overall: f64,
    scores: &[CategoryScore],
    context: &str,
    evidence: &str,
) -> String {
    let score_lines = scores
        .iter()
        .map(|s| format!("* {}: {}", s.category, format_score(s.score)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Write a concise investment memo for {name}.\n\n\
         SCORES:\nOverall: {overall}/100\n{scores}\n\n\
         SOURCE 1 (DOCUMENTS):\n{context}\n\n\
         SOURCE 2 (WEB VALIDATION):\n{evidence}\n\n\
         Structure:\n\
         ### Executive Summary\nA verdict sentence quoting the overall score and the core value proposition.\n\
         ### Key Strengths\nThe three highest scoring categories, one evidence sentence each.\n\
         ### Critical Risks\nThe lowest scoring category and any discrepancy between documents and web research.\n\
         ### Final Recommendation\nOne decisive sentence.",
        name = entity_name,
        overall = format_score(overall),
        scores = score_lines,
        context = context,
        evidence = evidence_or_placeholder(evidence),
    )
}

pub fn dedup_prompt(label: &str, items: &[String]) -> String {
    let numbered = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "The following {label} were collected from several analyses and may repeat the same \
         point in different words.\n\n{numbered}\n\n\
         Return ONLY a JSON array with the numbers of the items to keep, one per distinct \
         point, most important first. Example: [3, 1, 7]",
        label = label.replace('_', " "),
        numbered = numbered,
    )
}

pub fn question_prompt(question: &str, context: &str) -> String {
    format!(
        "A user has a question about a completed company evaluation.\n\n\
         === EVALUATION CONTEXT ===\n{context}\n\n\
         === USER'S QUESTION ===\n{question}\n\n\
         === INSTRUCTIONS ===\n\
         1. Answer only the question asked.\n\
         2. Base the answer strictly on the context above.\n\
         3. If the context does not contain the answer, say so.\n\
         4. Keep it concise and professional (3-5 sentences).\n\
         5. When asked about scores, explain the reasoning behind them from the context.",
        context = context,
        question = question,
    )
}

/// Read the entity's own TAM/SAM/SOM claims out of retrieved context
pub fn claimed_market_prompt(context: &str) -> String {
    format!(
        "Extract the market size claims made in these company documents.\n\n\
         {context}\n\n\
         Return ONLY a JSON object with these fields:\n\
         - \"tam\": total addressable market in billions of USD (number, 0 if not stated)\n\
         - \"sam\": serviceable addressable market in billions of USD (number, 0 if not stated)\n\
         - \"som\": serviceable obtainable market in billions of USD (number, 0 if not stated)\n\
         - \"tam_description\", \"sam_description\", \"som_description\": what each figure covers\n\
         - \"growth_rate\": the stated market growth rate, or an empty string",
        context = context,
    )
}

/// Size the market from web-search evidence, independent of the entity's claims
pub fn validated_market_prompt(market: &str, evidence: &str) -> String {
    format!(
        "Using only the search results below, estimate the size of the {market} market.\n\n\
         {evidence}\n\n\
         Return ONLY a JSON object with these fields:\n\
         - \"tam\": total addressable market in billions of USD\n\
         - \"sam\": serviceable market in billions of USD (about 30% of TAM if not stated)\n\
         - \"som\": obtainable market in billions of USD (about 10% of SAM if not stated)\n\
         - \"source\": the report or publication the figure comes from\n\
         Use 0 for any figure the results do not support.",
        market = market,
        evidence = evidence,
    )
}
