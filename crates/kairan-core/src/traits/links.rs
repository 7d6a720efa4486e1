//! URL building seam supplied by the surrounding routing layer.

use crate::types::{KairanbanId, PostId};

/// Builds public URLs for profiles and content, used for mention links
/// and push deep links.
pub trait ProfileLinks: Send + Sync {
    fn profile_url(&self, username: &str) -> String;
    fn post_url(&self, post: PostId) -> String;
    fn kairanban_url(&self, kairanban: KairanbanId) -> String;
}

/// Default implementation that joins paths onto a configured base URL.
#[derive(Debug, Clone)]
pub struct BaseUrlLinks {
    base: String,
}

impl BaseUrlLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }
}

impl ProfileLinks for BaseUrlLinks {
    fn profile_url(&self, username: &str) -> String {
        format!("{}/user/{}", self.base, username)
    }

    fn post_url(&self, post: PostId) -> String {
        format!("{}/post/{}", self.base, post)
    }

    fn kairanban_url(&self, kairanban: KairanbanId) -> String {
        format!("{}/kairanban/{}", self.base, kairanban)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let links = BaseUrlLinks::new("https://kairan.example.ac.jp/");
        assert_eq!(
            links.profile_url("田中"),
            "https://kairan.example.ac.jp/user/田中"
        );
        assert_eq!(
            links.post_url(PostId(12)),
            "https://kairan.example.ac.jp/post/12"
        );
    }
}
