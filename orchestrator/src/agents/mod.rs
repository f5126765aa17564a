pub mod planner;
pub mod report_writer;
pub mod retriever;
pub mod summarizer;

// Request methods understood by the worker agents
pub const SEARCH_METHOD: &str = "search";
pub const EXTRACT_CONTENT_METHOD: &str = "extract_content";
pub const SUMMARIZE_METHOD: &str = "summarize";
pub const EXTRACT_KEY_POINTS_METHOD: &str = "extract_key_points";
pub const FIND_RELEVANT_METHOD: &str = "find_relevant";
pub const INDEX_STATS_METHOD: &str = "index_stats";
pub const COMPARE_SOURCES_METHOD: &str = "compare_sources";
pub const GENERATE_REPORT_METHOD: &str = "generate_report";
pub const EXECUTIVE_SUMMARY_METHOD: &str = "create_executive_summary";
pub const FORMAT_REPORT_METHOD: &str = "format_report";
pub const RESEARCH_METHOD: &str = "research";

// Notification sent to a session as a run progresses
pub const PROGRESS_NOTIFICATION: &str = "research_progress";
