// src/utils.rs
use teloxide::types::UserId;
use teloxide::utils::html::escape;

/// Кликабельное HTML-упоминание вида <a href="tg://user?id=...">Имя</a>.
///
/// ВНИМАНИЕ: строку следует отправлять с ParseMode::Html.
pub fn mention_link(user_id: UserId, display_name: &str) -> String {
    // Экранируем отображаемое имя на случай спецсимволов.
    format!(
        r#"<a href="tg://user?id={}">{}</a>"#,
        user_id.0,
        escape(display_name)
    )
}

/// Приведение "@Name" -> "name" (lower-case, без '@').
pub fn normalize_username<S: AsRef<str>>(name: S) -> String {
    let n = name.as_ref().trim();
    let n = n.strip_prefix('@').unwrap_or(n);
    n.to_lowercase()
}

/// Страница списка: срез элементов плюс номера для строки пагинации.
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub number: usize,
    pub total_pages: usize,
}

/// Разбивка списка на страницы. Номер страницы с единицы; выход за границы
/// прижимается к ближайшей существующей странице, пустой список даёт одну
/// пустую страницу.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> Page<'_, T> {
    let total_pages = (items.len() + per_page - 1) / per_page;
    let total_pages = total_pages.max(1);
    let number = page.clamp(1, total_pages);
    let start = (number - 1) * per_page;
    let end = (start + per_page).min(items.len());
    Page {
        items: &items[start.min(items.len())..end],
        number,
        total_pages,
    }
}

/// Однострочный анонс сообщения: переносы схлопываются в пробелы,
/// длинный текст обрезается до `limit` символов с многоточием.
pub fn preview(text: &str, limit: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= limit {
        return flat;
    }
    let cut: String = flat.chars().take(limit.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Процент доставки рассылки, округлённый до сотых. Без получателей — 0.0.
pub fn delivery_rate(success: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let rate = success as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("@Name"), "name");
        assert_eq!(normalize_username("  @User_Name  "), "user_name");
        assert_eq!(normalize_username("Plain"), "plain");
        assert_eq!(normalize_username(""), "");
    }

    #[test]
    fn test_mention_link_html_escape() {
        let s = mention_link(UserId(123), r#"Alice & Bob <3"#);
        assert!(s.contains(r#"Alice &amp; Bob &lt;3"#));
        assert!(s.contains(r#"tg://user?id=123"#));
    }

    #[test]
    fn test_paginate_bounds() {
        let items: Vec<i32> = (1..=13).collect();

        let first = paginate(&items, 1, 6);
        assert_eq!(first.items, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(first.total_pages, 3);

        let last = paginate(&items, 3, 6);
        assert_eq!(last.items, &[13]);

        // выход за границы прижимается к последней странице
        let clamped = paginate(&items, 99, 6);
        assert_eq!(clamped.number, 3);
        assert_eq!(clamped.items, &[13]);

        let empty: Vec<i32> = Vec::new();
        let page = paginate(&empty, 1, 6);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("короткий", 60), "короткий");
        assert_eq!(preview("две\nстроки", 60), "две строки");

        let long = "а".repeat(80);
        let cut = preview(&long, 60);
        assert_eq!(cut.chars().count(), 60);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_delivery_rate() {
        assert_eq!(delivery_rate(0, 0), 0.0);
        assert_eq!(delivery_rate(3, 4), 75.0);
        assert_eq!(delivery_rate(1, 3), 33.33);
    }
}
