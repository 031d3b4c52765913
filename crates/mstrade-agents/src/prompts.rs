use mstrade_models::Specialty;

/// Output schema shared by every slave prompt.
fn response_schema() -> String {
    let example = serde_json::json!({
        "action": "BUY | SELL | HOLD",
        "confidence": "0.75",
        "recommendations": ["<most important first>"],
        "findings": {}
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

const DATA_FORMAT: &str = "## DATA FORMAT\n\n\
    The user message is a JSON object with:\n\
    - `task` → {\"specialty\", \"symbol\", \"snapshot\": portfolio snapshot with `cash`, \
    `positions` (symbol → {quantity, avg_entry_price, mark_price, unrealized_pnl}), \
    `marks`, `volatility`, `drawdown`}\n\
    - `context.market` → {\"price\", \"volume\", \"volatility\" (fraction), \"change_24h\" \
    (fraction), \"fair_value\" (nullable)} or null\n\
    - `context.news` → [{\"headline\", \"source\", \"sentiment\" (-1.0 to 1.0), \
    \"published_at\"}]\n\n\
    All decimals are quoted strings.\n\n";

fn with_schema(role: &str, rules: &str, findings: &str) -> String {
    format!(
        "You are the {role} slave in a master-slave trading system. The master asks you \
         to research one instrument and return a directional call.\n\n\
         {DATA_FORMAT}\
         ## INTERPRETATION RULES\n\n\
         {rules}\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n\
         {}\n\n\
         The confidence field is a decimal string between \"0.0\" and \"1.0\".\n\
         In the findings field, include: {findings}.",
        response_schema()
    )
}

pub fn technical_system_prompt() -> String {
    with_schema(
        "technical analysis",
        "### Momentum (change_24h)\n\
         - change_24h > +2%: BUY\n\
         - change_24h < -2%: SELL\n\
         - otherwise: HOLD with confidence 0.40\n\
         - Confidence = 0.50 + min(|change_24h| × 5, 0.40)\n\n\
         ### Volatility penalty\n\
         - volatility > 0.70: subtract 0.10 from confidence, note elevated volatility",
        "momentum, change_24h, volatility_regime",
    )
}

pub fn fundamental_system_prompt() -> String {
    with_schema(
        "fundamental analysis",
        "### Valuation gap\n\
         gap = (fair_value - price) / price\n\
         - fair_value missing: HOLD with confidence 0.30\n\
         - gap > +5%: BUY (undervalued)\n\
         - gap < -5%: SELL (overvalued)\n\
         - otherwise: HOLD with confidence 0.40\n\
         - Confidence = 0.55 + min(|gap| × 2, 0.35)",
        "valuation_gap, fair_value, price",
    )
}

pub fn sentiment_system_prompt() -> String {
    with_schema(
        "market sentiment",
        "### News sentiment\n\
         avg = mean sentiment over the news items\n\
         - no news: HOLD with confidence 0.30\n\
         - avg > +0.2: BUY\n\
         - avg < -0.2: SELL\n\
         - otherwise: HOLD with confidence 0.40\n\
         - Confidence = 0.50 + |avg| × 0.40 × min(item_count, 5) / 5\n\n\
         A single headline is weak evidence; five or more carry full weight.",
        "average_sentiment, item_count, headlines",
    )
}

pub fn risk_system_prompt() -> String {
    with_schema(
        "risk assessment",
        "### Open position drawdown\n\
         - The portfolio holds `symbol` and its unrealized loss exceeds 8% of cost basis: \
         SELL with confidence 0.75 (cut the loser)\n\n\
         ### Volatility regime\n\
         - volatility > 0.70: SELL, confidence = 0.60 + min(volatility - 0.70, 0.30)\n\
         - volatility < 0.30: BUY with confidence 0.55 (calm regime)\n\
         - otherwise: HOLD with confidence 0.40\n\n\
         Position drawdown takes precedence over the volatility regime.",
        "volatility, position_pnl_fraction, regime",
    )
}

pub fn specialist_prompt(specialty: Specialty) -> String {
    match specialty {
        Specialty::Technical => technical_system_prompt(),
        Specialty::Fundamental => fundamental_system_prompt(),
        Specialty::Sentiment => sentiment_system_prompt(),
        Specialty::Risk => risk_system_prompt(),
    }
}
