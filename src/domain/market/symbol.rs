/// Quote currencies recognised when normalising crypto symbols, longest first
/// so that `USDT` wins over `USD`.
const CRYPTO_QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "BUSD", "USD", "EUR", "BTC", "ETH"];

/// Normalizes a crypto symbol to `BASE/QUOTE` form.
///
/// # Examples
/// ```
/// use hourcast::domain::market::symbol::normalize_crypto_symbol;
///
/// assert_eq!(normalize_crypto_symbol("BTCUSDT").unwrap(), "BTC/USDT");
/// assert_eq!(normalize_crypto_symbol("ETHEUR").unwrap(), "ETH/EUR");
/// assert_eq!(normalize_crypto_symbol("btc/usdt").unwrap(), "BTC/USDT");
/// ```
pub fn normalize_crypto_symbol(symbol: &str) -> Result<String, String> {
    let symbol = symbol.trim().to_uppercase();

    if symbol.is_empty() {
        return Err("Cannot normalize empty symbol".to_string());
    }

    if symbol.contains('/') {
        return Ok(symbol);
    }

    for quote in CRYPTO_QUOTE_CURRENCIES {
        if symbol.ends_with(quote) && symbol.len() > quote.len() {
            let base = &symbol[..symbol.len() - quote.len()];
            if base.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Ok(format!("{}/{}", base, quote));
            }
        }
    }

    Err(format!(
        "Cannot normalize crypto symbol: '{}' - no recognized quote currency",
        symbol
    ))
}

/// Reverse of `normalize_crypto_symbol`, used for exchange API calls.
///
/// ```
/// use hourcast::domain::market::symbol::denormalize_crypto_symbol;
///
/// assert_eq!(denormalize_crypto_symbol("BTC/USDT"), "BTCUSDT");
/// assert_eq!(denormalize_crypto_symbol("ETHUSDT"), "ETHUSDT");
/// ```
pub fn denormalize_crypto_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}
