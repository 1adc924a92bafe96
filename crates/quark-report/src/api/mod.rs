//! API clients for upstream market data providers

pub mod eastmoney;

pub use eastmoney::{Board, Candle, EastMoneyClient, FinanceIndicators, FundFlow, QuoteSnapshot};
