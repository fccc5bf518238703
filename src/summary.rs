use std::rc::Rc;

use serde::Serialize;

use crate::format::format_amount_cents;
use crate::normalize::{DEFAULT_CURRENCY, Transaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub count: usize,
    pub income_cents: i64,
    /// Zero or negative.
    pub expense_cents: i64,
    pub net_cents: i64,
}

pub fn summarize(view: &[Rc<Transaction>]) -> Summary {
    let mut income = 0i64;
    let mut expense = 0i64;
    for t in view {
        let v = t.amount_cents().unwrap_or(0);
        if v > 0 {
            income = income.saturating_add(v);
        } else {
            expense = expense.saturating_add(v);
        }
    }
    Summary {
        count: view.len(),
        income_cents: income,
        expense_cents: expense,
        net_cents: income.saturating_add(expense),
    }
}

impl Summary {
    pub fn count_label(&self) -> String {
        format!("{} tx", self.count)
    }

    pub fn income_label(&self) -> String {
        self.label("Income", self.income_cents)
    }

    /// Expenses are shown as a magnitude.
    pub fn expense_label(&self) -> String {
        self.label("Expense", self.expense_cents.saturating_abs())
    }

    pub fn net_label(&self) -> String {
        self.label("Net", self.net_cents)
    }

    pub fn chips(&self) -> [String; 4] {
        [
            self.count_label(),
            self.income_label(),
            self.expense_label(),
            self.net_label(),
        ]
    }

    fn label(&self, name: &str, cents: i64) -> String {
        if self.count == 0 {
            return format!("{name} 0");
        }
        format!("{name} {}", format_amount_cents(cents, DEFAULT_CURRENCY))
    }
}
