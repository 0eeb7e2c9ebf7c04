//! RTSP URL and SAT>IP parameter-grammar helpers (§6).

/// Build the SETUP URL: `base?<params>`, or just `base` when `params`
/// is empty.
pub fn setup_url(base: &str, params: &str) -> String {
    if params.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{params}")
    }
}

/// Build the PLAY/DESCRIBE/TEARDOWN URL: `base/stream=<id>[?<params>]`.
pub fn stream_url(base: &str, stream_id: i64, params: &str) -> String {
    let base = base.trim_end_matches('/');
    if params.is_empty() {
        format!("{base}/stream={stream_id}")
    } else {
        format!("{base}/stream={stream_id}?{params}")
    }
}

/// Apply the `ForcePilot` quirk: append `&plts=on` when the parameter
/// string names `msys=dvbs2` and does not already carry a `plts=` key.
pub fn apply_force_pilot(params: &str) -> String {
    let has_dvbs2 = params.split('&').any(|kv| kv.eq_ignore_ascii_case("msys=dvbs2"));
    let has_plts = params
        .split('&')
        .any(|kv| kv.to_ascii_lowercase().starts_with("plts="));
    if has_dvbs2 && !has_plts {
        format!("{params}&plts=on")
    } else {
        params.to_string()
    }
}

/// Join non-empty `key=value` fragments with `&`, first fragment
/// preceded by `?` when used as a URL suffix. Returns an empty string
/// if every fragment is empty, signalling "append nothing".
pub fn join_params(fragments: &[String]) -> String {
    fragments
        .iter()
        .filter(|f| !f.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_url_with_and_without_params() {
        assert_eq!(setup_url("rtsp://h/", ""), "rtsp://h/");
        assert_eq!(setup_url("rtsp://h/", "src=1"), "rtsp://h/?src=1");
    }

    #[test]
    fn stream_url_trims_trailing_slash() {
        assert_eq!(
            stream_url("rtsp://h/", 17, "pids=1"),
            "rtsp://h/stream=17?pids=1"
        );
        assert_eq!(stream_url("rtsp://h/", 17, ""), "rtsp://h/stream=17");
    }

    #[test]
    fn force_pilot_appends_plts_on() {
        let p = apply_force_pilot("src=1&freq=12207&pol=h&msys=dvbs2&mtype=8psk&sr=27500&fec=3/4");
        assert_eq!(
            p,
            "src=1&freq=12207&pol=h&msys=dvbs2&mtype=8psk&sr=27500&fec=3/4&plts=on"
        );
    }

    #[test]
    fn force_pilot_is_noop_when_plts_already_present() {
        let p = apply_force_pilot("msys=dvbs2&plts=off");
        assert_eq!(p, "msys=dvbs2&plts=off");
    }

    #[test]
    fn force_pilot_is_noop_for_non_dvbs2() {
        let p = apply_force_pilot("msys=dvbt");
        assert_eq!(p, "msys=dvbt");
    }

    #[test]
    fn join_params_skips_empty_fragments() {
        assert_eq!(
            join_params(&["pids=1,2".to_string(), String::new(), "x_pmt=3".to_string()]),
            "pids=1,2&x_pmt=3"
        );
    }
}
