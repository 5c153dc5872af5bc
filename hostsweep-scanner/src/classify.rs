/// Client errors that still prove a web server is answering for the name.
const LIVE_CLIENT_ERRORS: [u16; 28] = [
    400, 401, 403, 404, 405, 406, 407, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 418, 421,
    422, 423, 424, 425, 426, 428, 429, 431, 451,
];

/// Decide whether a status code signals a real web service.
///
/// Anything in `200..400` counts, as do the client errors a live server
/// sends when it rejects the request (auth walls, missing paths, rate
/// limits). 5xx and the remaining 4xx codes do not.
pub fn is_live_status(status_code: u16) -> bool {
    (200..400).contains(&status_code) || LIVE_CLIENT_ERRORS.contains(&status_code)
}
