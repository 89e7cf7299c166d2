use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, USER_AGENT,
};

/// Build the header set sent with every task pool request
///
/// The cookie is copied verbatim; an empty cookie or one that is not a
/// valid header value is left out.
///
/// # Examples
///
/// ```
/// use autoclaim::client::headers::build_api_headers;
///
/// let headers = build_api_headers("Mozilla/5.0", "BDUSS=abc");
/// assert!(headers.contains_key("cookie"));
/// ```
pub fn build_api_headers(user_agent: &str, cookie: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
    );

    if !cookie.is_empty() {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(_) => tracing::warn!("Cookie contains characters not allowed in a header"),
        }
    }

    headers
}

/// Headers for JSON POST bodies
pub fn build_json_headers(user_agent: &str, cookie: &str) -> HeaderMap {
    let mut headers = build_api_headers(user_agent, cookie);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
