//! Renders one client's financial state into the text block the AI receives
//! as conversational grounding. Pure formatting over repository data.

use crate::database::{ClientRepository, TransactionRepository};
use crate::error::AppResult;
use crate::models::{CategoryTotal, Direction, Transaction};

use super::ContextSummary;

/// How many transactions land in the context fetch
const CONTEXT_TX_FETCH: i64 = 100;

/// How many of the most recent transactions are rendered
const RECENT_TX_CAP: usize = 10;

#[derive(Clone)]
pub struct ContextBuilder {
    clients: ClientRepository,
    transactions: TransactionRepository,
}

impl ContextBuilder {
    pub fn new(clients: ClientRepository, transactions: TransactionRepository) -> Self {
        Self {
            clients,
            transactions,
        }
    }

    /// Build the context text. Empty string when no client is selected or
    /// the id does not resolve.
    pub async fn build(&self, client_id: Option<&str>) -> AppResult<String> {
        let Some(client_id) = client_id else {
            return Ok(String::new());
        };
        let Some(client) = self.clients.get_by_id(client_id).await? else {
            return Ok(String::new());
        };

        let transactions = self
            .transactions
            .list_by_client(client_id, Some(CONTEXT_TX_FETCH))
            .await?;
        let summary = self.transactions.summary(client_id).await?;
        let categories = self.transactions.by_category(client_id).await?;

        let mut context = format!(
            "Данные клиента:\n\
             - Имя клиента: {}\n\
             - Email: {}\n\
             - Телефон: {}\n\
             - Статус: {}\n\
             \n\
             Финансовая сводка:\n\
             - Общий доход: {} ₽\n\
             - Общие расходы: {} ₽\n\
             - Баланс: {} ₽\n\
             - Всего транзакций: {}\n",
            client.name,
            client.email.as_deref().unwrap_or("Не указан"),
            client.phone.as_deref().unwrap_or("Не указан"),
            client.status,
            format_amount(summary.total_income),
            format_amount(summary.total_expense),
            format_amount(summary.balance),
            summary.transaction_count,
        );

        if !categories.is_empty() {
            context.push_str("\nТранзакции по категориям:\n");
            render_category_group(&mut context, &categories, Direction::Income, "Доходы");
            render_category_group(&mut context, &categories, Direction::Expense, "Расходы");
        }

        if !transactions.is_empty() {
            context.push_str(&format!("\nПоследние {} транзакций:\n", RECENT_TX_CAP));
            for tx in transactions.iter().take(RECENT_TX_CAP) {
                context.push_str(&render_transaction_line(tx));
            }
        }

        Ok(context)
    }

    /// Condensed snapshot reported alongside a successful answer.
    pub async fn summary(&self, client_id: &str) -> AppResult<ContextSummary> {
        let client = self.clients.get_by_id(client_id).await?;
        let summary = self.transactions.summary(client_id).await?;
        Ok(ContextSummary {
            client_name: client.map(|c| c.name),
            transaction_count: summary.transaction_count,
            balance: summary.balance,
        })
    }
}

fn render_category_group(
    out: &mut String,
    categories: &[CategoryTotal],
    direction: Direction,
    header: &str,
) {
    let group: Vec<&CategoryTotal> = categories
        .iter()
        .filter(|c| Direction::from_raw(&c.direction) == direction)
        .collect();
    if group.is_empty() {
        return;
    }
    out.push_str(&format!("\n{}:\n", header));
    for cat in group {
        out.push_str(&format!(
            "  {} {}: {}{} ₽ ({} транзакций)\n",
            direction.emoji(),
            cat.category,
            direction.sign(),
            format_amount(cat.total),
            cat.count,
        ));
    }
}

fn render_transaction_line(tx: &Transaction) -> String {
    let direction = Direction::from_raw(&tx.direction);
    let mut line = format!(
        "  {} {} | {} | {}{} ₽",
        direction.emoji(),
        tx.transaction_date.as_deref().unwrap_or(""),
        tx.category,
        direction.sign(),
        format_amount(tx.amount),
    );
    if let Some(description) = tx.description.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" | {}", description));
    }
    line.push('\n');
    line
}

/// Format an amount with thousands separators and two decimals, the way the
/// system prompt tells the model sums look: `125,000.00`.
pub fn format_amount(value: f64) -> String {
    let negative = value < 0.0;
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-{}.{}", grouped, frac_part)
    } else {
        format!("{}.{}", grouped, frac_part)
    }
}
