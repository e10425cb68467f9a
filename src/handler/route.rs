use crate::config::RouteConfig;

/// Picks the route with the longest prefix of `path`.
///
/// A prefix only matches on a segment boundary: `/api` matches `/api` and
/// `/api/x` but not `/apix`. A prefix ending in `/` (including `/` itself)
/// is its own boundary.
pub fn match_route<'a>(path: &str, routes: &'a [RouteConfig]) -> Option<&'a RouteConfig> {
    routes
        .iter()
        .filter(|route| prefix_matches(&route.path, path))
        .max_by_key(|route| route.path.len())
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(paths: &[&str]) -> Vec<RouteConfig> {
        paths.iter().map(|p| RouteConfig::new(*p)).collect()
    }

    #[test]
    fn longest_prefix_wins() {
        let table = routes(&["/", "/api", "/api/v1"]);
        assert_eq!(match_route("/api/v1/users", &table).unwrap().path, "/api/v1");
        assert_eq!(match_route("/api/v2", &table).unwrap().path, "/api");
        assert_eq!(match_route("/index.html", &table).unwrap().path, "/");
    }

    #[test]
    fn boundary_is_enforced() {
        let table = routes(&["/api"]);
        assert!(match_route("/apix", &table).is_none());
        assert!(match_route("/api", &table).is_some());
        assert!(match_route("/api/", &table).is_some());
    }

    #[test]
    fn no_routes_no_match() {
        assert!(match_route("/", &[]).is_none());
    }
}
