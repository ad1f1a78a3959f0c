use clap::Parser;
#[cfg(target_arch = "wasm32")]
use std::collections::HashMap;

#[cfg(target_arch = "wasm32")]
thread_local! {
    static ENV_MAP: std::cell::RefCell<HashMap<String, String>> = std::cell::RefCell::new(HashMap::new());
}

/// Program name passed as the first argument when parsing GET parameters
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
const PROGRAM_NAME: &str = "heatmap-viewer";

/// Get an environment variable, parsing it to the desired type.
///
/// On web, variables come from `env`-prefixed GET parameters.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    #[cfg(target_arch = "wasm32")]
    {
        ENV_MAP.with(|map| map.borrow().get(key).and_then(|s| s.parse().ok()))
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::env::var(key).ok().and_then(|s| s.parse().ok())
    }
}

/// Parses from the command line arguments on native and from GET parameters on web.
pub fn parse_args<T: Parser>() -> Result<T, clap::Error> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        T::try_parse()
    }
    #[cfg(target_arch = "wasm32")]
    {
        let (args, _) = split_query(&location_query());
        T::try_parse_from(args)
    }
}

/// Load `env`-prefixed GET parameters so [`get_env`] can see them.
#[cfg(target_arch = "wasm32")]
pub fn parse_env() {
    let (_, env) = split_query(&location_query());
    ENV_MAP.with(|map| map.borrow_mut().extend(env));
}

#[cfg(target_arch = "wasm32")]
fn location_query() -> String {
    web_sys::window()
        .and_then(|w| w.location().search().ok())
        .unwrap_or_default()
}

/// Split a URL query into CLI arguments and environment variables.
///
/// `?cliserver=http://h:8080/&clidataset=de&envLOG_LEVEL=debug` becomes
/// `["heatmap-viewer", "--server", "http://h:8080/", "--dataset", "de"]` and
/// `[("LOG_LEVEL", "debug")]`. Keys without a value become bare flags.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub fn split_query(query: &str) -> (Vec<String>, Vec<(String, String)>) {
    let mut args = vec![PROGRAM_NAME.to_string()];
    let mut env = Vec::new();

    let query = query.trim_start_matches('?');
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let Some(arg_key) = key.strip_prefix("cli") {
            if !arg_key.is_empty() {
                args.push(format!("--{arg_key}"));
            }
            if !value.is_empty() {
                args.push(value.to_string());
            }
        } else if let Some(env_key) = key.strip_prefix("env")
            && !env_key.is_empty()
        {
            env.push((env_key.to_string(), value.to_string()));
        }
    }

    (args, env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_query_cli_and_env() {
        let (args, env) =
            split_query("?cliserver=http://h:8080/&clidataset=de&envLOG_LEVEL=debug&other=1");
        assert_eq!(
            args,
            vec![
                "heatmap-viewer",
                "--server",
                "http://h:8080/",
                "--dataset",
                "de"
            ]
        );
        assert_eq!(env, vec![("LOG_LEVEL".to_string(), "debug".to_string())]);
    }

    #[test]
    fn test_split_query_bare_flags() {
        let (args, env) = split_query("cliignore-persisted&envRUST_BACKTRACE");
        assert_eq!(args, vec!["heatmap-viewer", "--ignore-persisted"]);
        assert_eq!(env, vec![("RUST_BACKTRACE".to_string(), String::new())]);
    }

    #[test]
    fn test_split_query_empty() {
        let (args, env) = split_query("");
        assert_eq!(args, vec!["heatmap-viewer"]);
        assert!(env.is_empty());
    }
}
