//! Fixed-point currency amounts
//!
//! Balances are counted in hundredths so that reconciling a stored balance against the
//! live one never accumulates floating point drift.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Sub, str::FromStr};
use thiserror::Error;

/// A currency amount with two fractional digits
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Balance(i64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceParseError {
	#[error("empty amount")]
	Empty,
	#[error("invalid amount: {0}")]
	Invalid(String),
	#[error("amount has more than two fractional digits: {0}")]
	TooPrecise(String),
	#[error("amount out of range: {0}")]
	OutOfRange(String),
}

impl Balance {
	pub const ZERO: Balance = Balance(0);

	pub const fn from_cents(cents: i64) -> Self {
		Self(cents)
	}

	pub const fn cents(&self) -> i64 {
		self.0
	}

	/// Convert from a provider-side floating point amount, rounding to the nearest cent
	pub fn from_f64(amount: f64) -> Option<Self> {
		if !amount.is_finite() {
			return None;
		}
		let cents = (amount * 100.0).round();
		if cents > i64::MAX as f64 || cents < i64::MIN as f64 {
			return None;
		}
		Some(Self(cents as i64))
	}

	/// Convert from a stored decimal, rounding to the nearest cent
	pub fn from_decimal(amount: Decimal) -> Option<Self> {
		amount
			.checked_mul(Decimal::ONE_HUNDRED)?
			.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
			.to_i64()
			.map(Self)
	}

	pub fn is_negative(&self) -> bool {
		self.0 < 0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == 0
	}

	pub fn abs(&self) -> Self {
		Self(self.0.saturating_abs())
	}

	/// Clamp negative amounts to zero
	pub fn non_negative(&self) -> Self {
		Self(self.0.max(0))
	}
}

impl Sub for Balance {
	type Output = Balance;

	fn sub(self, rhs: Self) -> Self::Output {
		Balance(self.0.saturating_sub(rhs.0))
	}
}

impl From<Balance> for Decimal {
	fn from(balance: Balance) -> Self {
		Decimal::new(balance.0, 2)
	}
}

impl fmt::Display for Balance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let sign = if self.0 < 0 { "-" } else { "" };
		let abs = self.0.unsigned_abs();
		write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
	}
}

impl FromStr for Balance {
	type Err = BalanceParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(BalanceParseError::Empty);
		}

		let (negative, digits) = match s.strip_prefix('-') {
			Some(rest) => (true, rest),
			None => (false, s.strip_prefix('+').unwrap_or(s)),
		};

		let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
		if whole.is_empty() && fraction.is_empty() {
			return Err(BalanceParseError::Invalid(s.to_string()));
		}
		if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
		{
			return Err(BalanceParseError::Invalid(s.to_string()));
		}
		if fraction.len() > 2 {
			return Err(BalanceParseError::TooPrecise(s.to_string()));
		}

		let whole: i64 = if whole.is_empty() {
			0
		} else {
			whole
				.parse()
				.map_err(|_| BalanceParseError::OutOfRange(s.to_string()))?
		};
		let fraction: i64 = match fraction.len() {
			0 => 0,
			1 => fraction.parse::<i64>().unwrap_or(0) * 10,
			_ => fraction.parse().unwrap_or(0),
		};

		let cents = whole
			.checked_mul(100)
			.and_then(|c| c.checked_add(fraction))
			.ok_or_else(|| BalanceParseError::OutOfRange(s.to_string()))?;

		Ok(Self(if negative { -cents } else { cents }))
	}
}
