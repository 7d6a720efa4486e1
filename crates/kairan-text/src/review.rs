//! Structured course-review template.
//!
//! Review posts are authored from a fixed template: one block per
//! subject, blocks separated by `---` lines, each block opening with
//! an inline span marking the subject, then grade and teacher spans,
//! then free-form body text. The parser recovers the structured fields
//! so the edit form can re-populate them.

use once_cell::sync::Lazy;
use regex::Regex;

/// Exact opening the template produces; anything else is not a review.
const REVIEW_PREFIX: &str = "<span class=\"review-subject\">";

const SUBJECT_SENTINEL: &str = "ここに科目を入力";
const GRADE_SENTINEL: &str = "ここに成績を入力";
const TEACHER_SENTINEL: &str = "ここに教員名を入力";
const BODY_SENTINEL: &str = "本文を入力";

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)^<span class="review-subject">(.*?)</span>\s*成績:<span class="review-grade">(.*?)</span>\s*教員:<span class="review-teacher">(.*?)</span>\s*(.*)$"#,
    )
    .unwrap()
});

/// One subject's worth of review fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewBlock {
    pub subject: String,
    pub grade: String,
    pub teacher: String,
    pub body: String,
}

/// A parsed course-review post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseReview {
    pub blocks: Vec<ReviewBlock>,
}

/// Fresh template body for the posting form, one empty block.
pub fn review_template_body() -> String {
    format!(
        "{REVIEW_PREFIX}{SUBJECT_SENTINEL}</span>　成績:<span class=\"review-grade\">{GRADE_SENTINEL}</span>　教員:<span class=\"review-teacher\">{TEACHER_SENTINEL}</span>\n{BODY_SENTINEL}"
    )
}

/// Parse a post body as a course review.
///
/// Returns `None` unless the body starts exactly with the template's
/// opening markup. Placeholder sentinels left in place come back as
/// empty fields. A block whose span structure is broken is skipped
/// rather than failing the whole parse.
pub fn parse_review_body(body: &str) -> Option<CourseReview> {
    if !body.starts_with(REVIEW_PREFIX) {
        return None;
    }

    let blocks: Vec<ReviewBlock> = split_blocks(body)
        .filter_map(|chunk| {
            let caps = BLOCK_RE.captures(chunk)?;
            Some(ReviewBlock {
                subject: field(&caps[1], SUBJECT_SENTINEL),
                grade: field(&caps[2], GRADE_SENTINEL),
                teacher: field(&caps[3], TEACHER_SENTINEL),
                body: field(&caps[4], BODY_SENTINEL),
            })
        })
        .collect();

    if blocks.is_empty() {
        return None;
    }
    Some(CourseReview { blocks })
}

/// Chunks separated by lines consisting solely of `---`.
fn split_blocks(body: &str) -> impl Iterator<Item = &str> {
    body.split("\n---\n")
        .flat_map(|chunk| chunk.split("\n---"))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
}

fn field(raw: &str, sentinel: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == sentinel {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(subject: &str, grade: &str, teacher: &str, body: &str) -> String {
        format!(
            "<span class=\"review-subject\">{subject}</span>　成績:<span class=\"review-grade\">{grade}</span>　教員:<span class=\"review-teacher\">{teacher}</span>\n{body}"
        )
    }

    #[test]
    fn single_block_round_trip() {
        let body = block("解析学", "A", "山田", "板書が速い");
        let review = parse_review_body(&body).unwrap();
        assert_eq!(review.blocks.len(), 1);
        assert_eq!(review.blocks[0].subject, "解析学");
        assert_eq!(review.blocks[0].grade, "A");
        assert_eq!(review.blocks[0].teacher, "山田");
        assert_eq!(review.blocks[0].body, "板書が速い");
    }

    #[test]
    fn multiple_blocks_split_on_separator() {
        let body = format!(
            "{}\n---\n{}",
            block("解析学", "A", "山田", "良い"),
            block("力学", "B", "佐藤", "難しい")
        );
        let review = parse_review_body(&body).unwrap();
        assert_eq!(review.blocks.len(), 2);
        assert_eq!(review.blocks[1].subject, "力学");
    }

    #[test]
    fn sentinels_map_to_empty_fields() {
        let review = parse_review_body(&review_template_body()).unwrap();
        assert_eq!(review.blocks.len(), 1);
        assert_eq!(review.blocks[0], ReviewBlock::default());
    }

    #[test]
    fn wrong_prefix_is_not_a_review() {
        assert!(parse_review_body("ふつうの投稿です").is_none());
        // Even with the right spans later on, the opening must match.
        let body = format!("前置き\n{}", block("x", "y", "z", "w"));
        assert!(parse_review_body(&body).is_none());
    }

    #[test]
    fn broken_block_is_skipped() {
        let body = format!(
            "{}\n---\nこの塊は壊れている",
            block("解析学", "A", "山田", "良い")
        );
        let review = parse_review_body(&body).unwrap();
        assert_eq!(review.blocks.len(), 1);
    }
}
