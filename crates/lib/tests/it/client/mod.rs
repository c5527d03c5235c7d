mod search;
mod snapshots;
mod writability;
